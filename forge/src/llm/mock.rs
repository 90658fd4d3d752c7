//! Scripted runtime for tests.
//!
//! Responses come from a responder closure over the prompt, so one mock can
//! serve a whole workflow run. Embeddings are deterministic token-bucket
//! vectors: identical texts embed identically and share most buckets with
//! near-identical texts, which is enough for similarity tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::CoreError;
use crate::llm::{LlmRuntime, ModelInfo, SamplingOptions};

pub const MOCK_EMBED_DIM: usize = 64;

type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub struct MockLlm {
    responder: Responder,
    calls: Mutex<Vec<String>>,
}

impl MockLlm {
    /// Always answers with the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::with_responder(move |_| response.clone())
    }

    /// Answers via a closure over the prompt.
    pub fn with_responder(responder: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock lock poisoned").len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().expect("mock lock poisoned").clone()
    }

    /// Deterministic embedding: hash each whitespace token into one of
    /// `MOCK_EMBED_DIM` buckets and L2-normalize the counts.
    pub fn embed_text(text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; MOCK_EMBED_DIM];
        for token in text.to_lowercase().split_whitespace() {
            let mut hash: u64 = 1469598103934665603;
            for b in token.bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            vector[(hash % MOCK_EMBED_DIM as u64) as usize] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl LlmRuntime for MockLlm {
    async fn generate(
        &self,
        _model: &str,
        prompt: &str,
        _options: &SamplingOptions,
    ) -> Result<String, CoreError> {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .push(prompt.to_string());
        Ok((self.responder)(prompt))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, CoreError> {
        Ok(vec![ModelInfo {
            name: "mock-model".to_string(),
            size_bytes: 0,
        }])
    }

    async fn embeddings(&self, _model: &str, text: &str) -> Result<Vec<f32>, CoreError> {
        Ok(Self::embed_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responder_sees_prompt() {
        let llm = MockLlm::with_responder(|prompt| {
            if prompt.contains("plan") {
                "PLAN: do it".to_string()
            } else {
                "ok".to_string()
            }
        });
        let plan = llm
            .generate("m", "make a plan", &SamplingOptions::default())
            .await
            .unwrap();
        assert_eq!(plan, "PLAN: do it");
        assert_eq!(llm.call_count(), 1);
    }

    #[test]
    fn identical_texts_embed_identically() {
        let a = MockLlm::embed_text("parse CSV to list of dicts");
        let b = MockLlm::embed_text("parse CSV to list of dicts");
        assert_eq!(a, b);
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot - 1.0).abs() < 1e-5);
    }

    #[test]
    fn different_texts_embed_differently() {
        let a = MockLlm::embed_text("parse CSV files");
        let b = MockLlm::embed_text("write a tetris game");
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!(dot < 0.99);
    }
}
