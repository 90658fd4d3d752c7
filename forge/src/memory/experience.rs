//! Task-experience store: append-only outcomes with similarity retrieval.
//!
//! Each saved experience becomes one retrieval document (task, intent,
//! score, plan/code prefixes, notes) in the vector index, with metadata
//! carrying the scores and 500-char previews. `find_similar` feeds planning
//! recommendations; `find_exact` short-circuits the whole workflow when a
//! near-identical successful task was already solved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CoreError;
use crate::logfab::{LogEvent, LogManager, LogSource};
use crate::memory::embedder::Embedder;
use crate::memory::vector::VectorStore;

pub const EXACT_SIMILARITY_THRESHOLD: f32 = 0.85;
pub const EXACT_MIN_SUCCESS: f32 = 0.8;
const PREVIEW_CHARS: usize = 500;
const DOCUMENT_CODE_CHARS: usize = 2000;
const DOCUMENT_PLAN_CHARS: usize = 1000;

/// Per-stage scores from reflection, each in [0, 1].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct StageScores {
    pub planning: f32,
    pub research: f32,
    pub testing: f32,
    pub coding: f32,
    pub overall: f32,
}

/// One finished task's outcome, as saved.
#[derive(Clone, Debug)]
pub struct TaskExperience {
    pub task: String,
    pub intent: String,
    pub scores: StageScores,
    pub what_worked: String,
    pub what_didnt_work: String,
    pub key_decisions: String,
    pub code: Option<String>,
    pub plan: Option<String>,
}

/// One retrieval hit, parsed back from the stored document.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExperienceMatch {
    pub task: String,
    pub intent: String,
    pub success: f32,
    pub what_worked: String,
    pub key_decisions: String,
    pub plan: Option<String>,
    pub code: Option<String>,
    pub similarity: f32,
    pub has_code: bool,
}

pub struct TaskExperienceMemory {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    counter: AtomicU64,
    logs: Arc<LogManager>,
}

fn truncated(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

impl TaskExperienceMemory {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        logs: Arc<LogManager>,
    ) -> Self {
        Self {
            store,
            embedder,
            counter: AtomicU64::new(0),
            logs,
        }
    }

    fn format_document(experience: &TaskExperience) -> String {
        let mut parts = vec![
            format!("Task: {}", experience.task),
            format!("Intent: {}", experience.intent),
            format!("Success: {:.2}", experience.scores.overall),
        ];
        if let Some(ref plan) = experience.plan {
            parts.push(format!("Plan: {}", truncated(plan, DOCUMENT_PLAN_CHARS)));
        }
        if !experience.what_worked.is_empty() {
            parts.push(format!("What worked: {}", experience.what_worked));
        }
        if !experience.key_decisions.is_empty() {
            parts.push(format!("Key decisions: {}", experience.key_decisions));
        }
        if let Some(ref code) = experience.code {
            parts.push(format!("Code: {}", truncated(code, DOCUMENT_CODE_CHARS)));
        }
        if !experience.what_didnt_work.is_empty() {
            parts.push(format!("What didn't work: {}", experience.what_didnt_work));
        }
        parts.join("\n")
    }

    fn parse_document(document: &str, metadata: &serde_json::Value) -> ExperienceMatch {
        let mut matched = ExperienceMatch {
            intent: metadata
                .get("intent_type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            success: metadata
                .get("success")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as f32,
            has_code: metadata
                .get("has_code")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            ..Default::default()
        };

        // Single-line fields first, then multi-line field bodies keyed by
        // the most recent header.
        let mut current: Option<&str> = None;
        for line in document.lines() {
            let line = line.trim_end();
            if let Some(rest) = line.strip_prefix("Task: ") {
                matched.task = rest.to_string();
                current = None;
            } else if let Some(rest) = line.strip_prefix("Plan: ") {
                matched.plan = Some(rest.to_string());
                current = Some("plan");
            } else if let Some(rest) = line.strip_prefix("Code: ") {
                matched.code = Some(rest.to_string());
                current = Some("code");
            } else if let Some(rest) = line.strip_prefix("What worked: ") {
                matched.what_worked = rest.to_string();
                current = Some("what_worked");
            } else if let Some(rest) = line.strip_prefix("Key decisions: ") {
                matched.key_decisions = rest.to_string();
                current = Some("key_decisions");
            } else if line.starts_with("Intent: ")
                || line.starts_with("Success: ")
                || line.starts_with("What didn't work: ")
            {
                current = None;
            } else if !line.is_empty() {
                match current {
                    Some("plan") => {
                        if let Some(ref mut plan) = matched.plan {
                            plan.push('\n');
                            plan.push_str(line);
                        }
                    }
                    Some("code") => {
                        if let Some(ref mut code) = matched.code {
                            code.push('\n');
                            code.push_str(line);
                        }
                    }
                    Some("what_worked") => {
                        matched.what_worked.push(' ');
                        matched.what_worked.push_str(line.trim());
                    }
                    Some("key_decisions") => {
                        matched.key_decisions.push(' ');
                        matched.key_decisions.push_str(line.trim());
                    }
                    _ => {}
                }
            }
        }
        matched
    }

    /// Saves one experience; returns its monotonically increasing id.
    pub async fn save(&self, experience: &TaskExperience) -> Result<u64, CoreError> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let document = Self::format_document(experience);
        // the index is keyed by the task text; the document is the payload
        let embedding = self.embedder.embed(&experience.task).await?;

        let mut metadata = json!({
            "task_id": format!("task_{}", id),
            "intent_type": experience.intent,
            "success": experience.scores.overall,
            "overall_score": experience.scores.overall,
            "planning_score": experience.scores.planning,
            "research_score": experience.scores.research,
            "testing_score": experience.scores.testing,
            "coding_score": experience.scores.coding,
            "has_code": experience.code.is_some(),
            "has_plan": experience.plan.is_some(),
        });
        if let Some(ref code) = experience.code {
            metadata["code_preview"] = json!(truncated(code, PREVIEW_CHARS));
        }
        if let Some(ref plan) = experience.plan {
            metadata["plan_preview"] = json!(truncated(plan, PREVIEW_CHARS));
        }

        self.store
            .add(
                vec![format!("task_{}", id)],
                vec![embedding],
                vec![document],
                vec![metadata],
            )
            .await?;

        self.logs.emit(
            LogEvent::info(format!(
                "saved task experience task_{} (success {:.2}, code: {})",
                id,
                experience.scores.overall,
                experience.code.is_some()
            ))
            .source(LogSource::Infrastructure)
            .stage("memory"),
        );
        Ok(id)
    }

    /// Top matches filtered by intent and minimum success.
    pub async fn find_similar(
        &self,
        query: &str,
        intent: Option<&str>,
        min_success: f32,
        max_results: usize,
    ) -> Result<Vec<ExperienceMatch>, CoreError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        // Over-fetch: intent and success filters run after the search.
        let hits = self.store.query(&embedding, max_results * 2).await?;

        let mut matches = Vec::new();
        for hit in hits {
            if let Some(intent) = intent {
                if hit.metadata.get("intent_type").and_then(|v| v.as_str()) != Some(intent) {
                    continue;
                }
            }
            let success = hit
                .metadata
                .get("success")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as f32;
            if success < min_success {
                continue;
            }
            let mut matched = Self::parse_document(&hit.document, &hit.metadata);
            matched.similarity = 1.0 - hit.distance;
            matches.push(matched);
            if matches.len() >= max_results {
                break;
            }
        }
        Ok(matches)
    }

    /// Best match when similarity clears `similarity_threshold`; used to
    /// short-circuit the workflow with the stored solution.
    pub async fn find_exact(
        &self,
        query: &str,
        similarity_threshold: f32,
        min_success: f32,
    ) -> Result<Option<ExperienceMatch>, CoreError> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.query(&embedding, 5).await?;
        for hit in hits {
            let similarity = 1.0 - hit.distance;
            if similarity < similarity_threshold {
                continue;
            }
            let success = hit
                .metadata
                .get("success")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as f32;
            if success < min_success {
                continue;
            }
            let mut matched = Self::parse_document(&hit.document, &hit.metadata);
            matched.similarity = similarity;
            self.logs.emit(
                LogEvent::info(format!(
                    "found a near-identical past task (similarity {:.2}, success {:.2})",
                    similarity, success
                ))
                .source(LogSource::Infrastructure)
                .stage("memory"),
            );
            return Ok(Some(matched));
        }
        Ok(None)
    }

    /// Renders the top similar successes into a prompt block for planning;
    /// empty when there is nothing relevant.
    pub async fn recommendations(&self, task: &str, intent: &str) -> Result<String, CoreError> {
        let similar = self.find_similar(task, Some(intent), 0.7, 2).await?;
        if similar.is_empty() {
            return Ok(String::new());
        }
        let mut parts = vec![
            "[Recommendations from memory]".to_string(),
            "Approaches that worked for similar past tasks:".to_string(),
        ];
        for (i, matched) in similar.iter().enumerate() {
            parts.push(format!("\n{}. Task: {}", i + 1, truncated(&matched.task, 100)));
            parts.push(format!("   Success: {:.2}", matched.success));
            if !matched.what_worked.is_empty() {
                parts.push(format!(
                    "   What worked: {}",
                    truncated(&matched.what_worked, 200)
                ));
            }
            if !matched.key_decisions.is_empty() {
                parts.push(format!(
                    "   Key decisions: {}",
                    truncated(&matched.key_decisions, 200)
                ));
            }
        }
        Ok(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::logfab::LogFabricConfig;
    use crate::memory::vector::InMemoryVectorStore;
    use async_trait::async_trait;

    struct MockEmbedder;

    #[async_trait]
    impl Embedder for MockEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
            Ok(MockLlm::embed_text(text))
        }
    }

    fn memory() -> TaskExperienceMemory {
        TaskExperienceMemory::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockEmbedder),
            Arc::new(LogManager::new(LogFabricConfig {
                enable_console: false,
                enable_file: false,
                ..Default::default()
            })),
        )
    }

    fn experience(task: &str, overall: f32, code: Option<&str>) -> TaskExperience {
        TaskExperience {
            task: task.to_string(),
            intent: "create".to_string(),
            scores: StageScores {
                planning: overall,
                research: overall,
                testing: overall,
                coding: overall,
                overall,
            },
            what_worked: "small focused functions".to_string(),
            what_didnt_work: String::new(),
            key_decisions: "used the std csv reader".to_string(),
            code: code.map(str::to_string),
            plan: Some("PLAN: read, split, collect".to_string()),
        }
    }

    #[tokio::test]
    async fn ids_increase_monotonically() {
        let memory = memory();
        let first = memory.save(&experience("task one", 0.9, None)).await.unwrap();
        let second = memory.save(&experience("task two", 0.9, None)).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn find_exact_returns_stored_solution_for_same_task() {
        let memory = memory();
        memory
            .save(&experience(
                "parse CSV to list of dicts",
                0.9,
                Some("fn parse_csv() {}"),
            ))
            .await
            .unwrap();
        let found = memory
            .find_exact(
                "parse CSV to list of dicts",
                EXACT_SIMILARITY_THRESHOLD,
                EXACT_MIN_SUCCESS,
            )
            .await
            .unwrap()
            .expect("identical task should match");
        assert!(found.similarity >= EXACT_SIMILARITY_THRESHOLD);
        assert!(found.has_code);
        assert_eq!(found.code.as_deref(), Some("fn parse_csv() {}"));
        assert!(found.plan.as_deref().unwrap_or("").contains("PLAN"));
    }

    #[tokio::test]
    async fn find_exact_skips_low_success() {
        let memory = memory();
        memory
            .save(&experience("parse CSV to list of dicts", 0.4, Some("x")))
            .await
            .unwrap();
        let found = memory
            .find_exact("parse CSV to list of dicts", 0.85, 0.8)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn find_similar_filters_by_intent() {
        let memory = memory();
        memory.save(&experience("build a parser", 0.9, None)).await.unwrap();
        let none = memory
            .find_similar("build a parser", Some("debug"), 0.5, 3)
            .await
            .unwrap();
        assert!(none.is_empty());
        let some = memory
            .find_similar("build a parser", Some("create"), 0.5, 3)
            .await
            .unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].task, "build a parser");
    }

    #[tokio::test]
    async fn recommendations_render_top_matches() {
        let memory = memory();
        memory
            .save(&experience("write a json converter", 0.85, None))
            .await
            .unwrap();
        let block = memory
            .recommendations("write a json converter", "create")
            .await
            .unwrap();
        assert!(block.contains("[Recommendations from memory]"));
        assert!(block.contains("What worked"));
    }

    #[tokio::test]
    async fn empty_query_finds_nothing() {
        let memory = memory();
        assert!(memory.find_similar("  ", None, 0.0, 3).await.unwrap().is_empty());
        assert!(memory.find_exact("", 0.5, 0.0).await.unwrap().is_none());
    }
}
