//! # LLM gateway
//!
//! [`LlmRuntime`] is the unified call surface over the local model runtime:
//! plain generation, schema-constrained structured generation with retries,
//! model listing, and embeddings. Implementations: [`HttpLlmRuntime`] for an
//! Ollama-compatible endpoint and [`MockLlm`] for tests.
//!
//! Structured calls validate the decoded payload against a caller-supplied
//! [`Schema`] and retry with the same prompt on validation failure; after
//! the retry budget the call fails with `CoreError::StructuredOutput` and
//! the fallback policy in [`structured`] takes over.

mod http;
mod mock;
pub mod schema;
pub mod structured;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;

pub use http::HttpLlmRuntime;
pub use mock::MockLlm;
pub use schema::{FieldKind, FieldSpec, Schema};
pub use structured::{generate_with_fallback, is_structured_output_enabled};

/// Sampling parameters for one call.
#[derive(Clone, Copy, Debug)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.25,
            max_tokens: 1024,
        }
    }
}

impl SamplingOptions {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// One installed model as reported by the runtime.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Unified call surface over the LLM runtime. Model names are opaque.
#[async_trait]
pub trait LlmRuntime: Send + Sync {
    /// One completion for the prompt.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &SamplingOptions,
    ) -> Result<String, CoreError>;

    /// Schema-constrained completion. The default implementation appends the
    /// schema hint to the prompt, extracts the first JSON object from the
    /// text, validates it, and retries `retries` times before failing with
    /// `StructuredOutput`.
    async fn generate_structured(
        &self,
        model: &str,
        prompt: &str,
        schema: &Schema,
        options: &SamplingOptions,
        retries: u32,
    ) -> Result<Value, CoreError> {
        let prompt = format!("{}\n\n{}", prompt, schema.prompt_hint());
        let mut last_error = String::new();
        for _ in 0..=retries {
            let text = self.generate(model, &prompt, options).await?;
            match extract_json(&text) {
                Some(value) => match schema.validate(&value) {
                    Ok(()) => return Ok(value),
                    Err(e) => last_error = e,
                },
                None => last_error = "no JSON object in response".to_string(),
            }
        }
        Err(CoreError::StructuredOutput(format!(
            "{} after {} retries: {}",
            schema.name, retries, last_error
        )))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, CoreError>;

    /// Embedding vector for the text. Failures surface as
    /// `UpstreamUnavailable`; there is no silent zero-vector fallback.
    async fn embeddings(&self, model: &str, text: &str) -> Result<Vec<f32>, CoreError>;
}

/// Extracts the first top-level JSON object from free-form model output.
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_finds_embedded_object() {
        let text = "Sure! Here you go:\n{\"intent\": \"create\", \"confidence\": 0.9}\nDone.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["intent"], "create");
    }

    #[test]
    fn extract_json_rejects_plain_text() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("} backwards {").is_none());
    }

    #[tokio::test]
    async fn structured_retries_then_fails() {
        let llm = MockLlm::fixed("not json at all");
        let schema = Schema::new("s").string("a");
        let err = llm
            .generate_structured("m", "p", &schema, &SamplingOptions::default(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StructuredOutput(_)));
        // initial attempt + 2 retries
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn structured_returns_validated_value() {
        let llm = MockLlm::fixed(r#"{"a": "ok"}"#);
        let schema = Schema::new("s").string("a");
        let v = llm
            .generate_structured("m", "p", &schema, &SamplingOptions::default(), 2)
            .await
            .unwrap();
        assert_eq!(v["a"], "ok");
        assert_eq!(llm.call_count(), 1);
    }
}
