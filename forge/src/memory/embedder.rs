//! Embedder: text to fixed-size vectors for the vector store.
//!
//! A failed embedding surfaces `UpstreamUnavailable`; there is deliberately
//! no zero-vector fallback, which would silently corrupt similarity scores.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::llm::LlmRuntime;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;
}

/// Embeds through the LLM runtime's embeddings endpoint.
pub struct RuntimeEmbedder {
    llm: Arc<dyn LlmRuntime>,
    model: String,
}

impl RuntimeEmbedder {
    pub fn new(llm: Arc<dyn LlmRuntime>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for RuntimeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let vector = self.llm.embeddings(&self.model, text).await?;
        if vector.is_empty() {
            return Err(CoreError::UpstreamUnavailable(
                "embedder returned an empty vector".into(),
            ));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    #[tokio::test]
    async fn runtime_embedder_delegates_to_runtime() {
        let llm: Arc<dyn LlmRuntime> = Arc::new(MockLlm::fixed("unused"));
        let embedder = RuntimeEmbedder::new(llm, "embed-model");
        let v = embedder.embed("hello world").await.unwrap();
        assert!(!v.is_empty());
    }
}
