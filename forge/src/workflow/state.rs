//! Mutable state threaded through one workflow run.

use serde_json::{json, Value};

use crate::agents::reflection::ReflectionOutcome;
use crate::intent::{Complexity, IntentResult, Mode};
use crate::request::TaskRequest;
use crate::validators::ValidationReport;

pub struct WorkflowState {
    pub request: TaskRequest,
    pub task_id: String,
    pub conversation_id: Option<String>,
    pub mode: Option<Mode>,
    pub intent: Option<IntentResult>,
    pub complexity: Complexity,
    pub plan: Option<String>,
    pub alternatives: Vec<String>,
    pub research_context: String,
    pub tests: Option<String>,
    pub code: Option<String>,
    pub validation: Option<ValidationReport>,
    pub diagnosis: Option<String>,
    pub fix_notes: Option<String>,
    pub reflection: Option<ReflectionOutcome>,
    pub final_message: Option<String>,
    /// Completed coding↔validation traversals; starts at 1.
    pub iteration: u32,
    pub reused: bool,
}

impl WorkflowState {
    pub fn new(request: TaskRequest, task_id: String) -> Self {
        let conversation_id = request.conversation_id.clone();
        Self {
            request,
            task_id,
            conversation_id,
            mode: None,
            intent: None,
            complexity: Complexity::Simple,
            plan: None,
            alternatives: Vec::new(),
            research_context: String::new(),
            tests: None,
            code: None,
            validation: None,
            diagnosis: None,
            fix_notes: None,
            reflection: None,
            final_message: None,
            iteration: 1,
            reused: false,
        }
    }

    pub fn task(&self) -> &str {
        &self.request.task
    }

    /// Aggregated result payload for the terminal `final_result` event.
    pub fn final_result(&self) -> Value {
        let mut result = json!({
            "task_id": self.task_id,
            "mode": self.mode.map(|m| m.as_str()),
            "iterations": self.iteration,
            "reused": self.reused,
        });
        if let Some(ref intent) = self.intent {
            result["intent"] = json!({
                "type": intent.kind.as_str(),
                "confidence": intent.confidence,
                "complexity": intent.complexity.as_str(),
            });
        }
        if let Some(ref message) = self.final_message {
            result["message"] = json!(message);
        }
        if let Some(ref plan) = self.plan {
            result["plan"] = json!(plan);
        }
        if let Some(ref tests) = self.tests {
            result["tests"] = json!(tests);
        }
        if let Some(ref code) = self.code {
            result["code"] = json!(code);
        }
        if let Some(ref validation) = self.validation {
            result["validation"] = validation.to_value();
        }
        result
    }

    /// Metrics payload: reflection scores, when reflection ran.
    pub fn metrics(&self) -> Option<Value> {
        self.reflection.as_ref().map(|r| {
            let scores = r.scores();
            json!({
                "planning": scores.planning,
                "research": scores.research,
                "testing": scores.testing,
                "coding": scores.coding,
                "overall": scores.overall,
            })
        })
    }
}
