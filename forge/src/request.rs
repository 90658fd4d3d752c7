//! Inbound request envelopes and their validation.
//!
//! A request that passes [`TaskRequest::validate`] satisfies every invariant
//! downstream stages rely on: non-empty text ≤ 10_000 chars, temperature in
//! [0.1, 0.7], iterations in [1, 5], a well-formed model name, and none of
//! the forbidden injection substrings.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Literal substrings rejected in request text. Defense in depth, not a
/// sandbox: the validators and the path guard are the real fences.
pub const FORBIDDEN_SUBSTRINGS: [&str; 5] =
    ["eval(", "exec(", "__import__", "os.system", "subprocess"];

static MODEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_.\-]+$").expect("model name pattern"));

/// User-chosen mode hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeHint {
    #[default]
    Auto,
    Chat,
    Code,
    Analyze,
}

/// One task request. Transient: validated, routed, executed, discarded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub mode: ModeHint,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub target_file: Option<String>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub disable_web_search: bool,
}

fn default_temperature() -> f32 {
    0.25
}

fn default_max_iterations() -> u32 {
    3
}

impl TaskRequest {
    /// A minimal request for the given task text, defaults elsewhere.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            mode: ModeHint::Auto,
            conversation_id: None,
            project_path: None,
            target_file: None,
            extensions: None,
            model: String::new(),
            temperature: default_temperature(),
            max_iterations: default_max_iterations(),
            disable_web_search: false,
        }
    }

    /// Validates all field constraints, returning the request with its task
    /// text stripped.
    pub fn validate(mut self) -> Result<Self, CoreError> {
        self.task = self.task.trim().to_string();
        if self.task.is_empty() {
            return Err(CoreError::InvalidRequest("task must not be empty".into()));
        }
        if self.task.chars().count() > 10_000 {
            return Err(CoreError::InvalidRequest(
                "task exceeds 10000 characters".into(),
            ));
        }
        let lowered = self.task.to_lowercase();
        for pattern in FORBIDDEN_SUBSTRINGS {
            if lowered.contains(pattern) {
                return Err(CoreError::InvalidRequest(format!(
                    "task contains forbidden pattern: {}",
                    pattern
                )));
            }
        }
        if !(0.1..=0.7).contains(&self.temperature) {
            return Err(CoreError::InvalidRequest(format!(
                "temperature {} outside [0.1, 0.7]",
                self.temperature
            )));
        }
        if !(1..=5).contains(&self.max_iterations) {
            return Err(CoreError::InvalidRequest(format!(
                "max_iterations {} outside [1, 5]",
                self.max_iterations
            )));
        }
        if !self.model.is_empty() && !MODEL_NAME_RE.is_match(&self.model) {
            return Err(CoreError::InvalidRequest(
                "model name contains invalid characters".into(),
            ));
        }
        Ok(self)
    }
}

/// Feedback on a finished task. Accepted values are exactly
/// `positive` and `negative`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub task: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub feedback: String,
}

impl FeedbackRequest {
    pub fn validate(mut self) -> Result<Self, CoreError> {
        self.task = self.task.trim().to_string();
        if self.task.is_empty() || self.task.chars().count() > 10_000 {
            return Err(CoreError::InvalidRequest(
                "task must be 1..=10000 characters".into(),
            ));
        }
        self.feedback = self.feedback.to_lowercase();
        if self.feedback != "positive" && self.feedback != "negative" {
            return Err(CoreError::InvalidRequest(
                "feedback must be 'positive' or 'negative'".into(),
            ));
        }
        Ok(self)
    }

    pub fn is_positive(&self) -> bool {
        self.feedback == "positive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_request_passes_and_strips() {
        let req = TaskRequest::new("  write a sort function  ").validate().unwrap();
        assert_eq!(req.task, "write a sort function");
        assert_eq!(req.max_iterations, 3);
    }

    #[test]
    fn empty_task_rejected() {
        assert!(matches!(
            TaskRequest::new("   ").validate(),
            Err(CoreError::InvalidRequest(_))
        ));
    }

    #[test]
    fn forbidden_substrings_rejected() {
        for bad in FORBIDDEN_SUBSTRINGS {
            let req = TaskRequest::new(format!("please run {}rm -rf", bad));
            assert!(req.validate().is_err(), "pattern {} should be rejected", bad);
        }
    }

    #[test]
    fn temperature_bounds_enforced() {
        let mut req = TaskRequest::new("task");
        req.temperature = 0.05;
        assert!(req.clone().validate().is_err());
        req.temperature = 0.7;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn iteration_bounds_enforced() {
        let mut req = TaskRequest::new("task");
        req.max_iterations = 0;
        assert!(req.clone().validate().is_err());
        req.max_iterations = 6;
        assert!(req.clone().validate().is_err());
        req.max_iterations = 5;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn model_name_pattern_enforced() {
        let mut req = TaskRequest::new("task");
        req.model = "qwen2.5-coder:7b".to_string();
        assert!(req.clone().validate().is_ok());
        req.model = "bad model name!".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn oversized_task_rejected() {
        let req = TaskRequest::new("x".repeat(10_001));
        assert!(req.validate().is_err());
    }

    #[test]
    fn feedback_accepts_exactly_two_values() {
        let ok = FeedbackRequest {
            task: "t".into(),
            task_id: None,
            feedback: "POSITIVE".into(),
        };
        assert!(ok.validate().unwrap().is_positive());
        let bad = FeedbackRequest {
            task: "t".into(),
            task_id: None,
            feedback: "meh".into(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn request_deserializes_from_snake_case_json() {
        let req: TaskRequest = serde_json::from_str(
            r#"{"task":"hi","mode":"chat","max_iterations":2,"disable_web_search":true}"#,
        )
        .unwrap();
        assert_eq!(req.mode, ModeHint::Chat);
        assert_eq!(req.max_iterations, 2);
        assert!(req.disable_web_search);
    }
}
