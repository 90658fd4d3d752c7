//! Ollama-compatible HTTP runtime client.
//!
//! Endpoints: `POST /api/generate`, `GET /api/tags`, `POST /api/embeddings`.
//! Every transport or decode failure maps to `UpstreamUnavailable`; the
//! retry policy around stage calls decides whether to try again.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::llm::schema::Schema;
use crate::llm::{LlmRuntime, ModelInfo, SamplingOptions};

pub struct HttpLlmRuntime {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl HttpLlmRuntime {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn unavailable(context: &str, e: impl std::fmt::Display) -> CoreError {
        CoreError::UpstreamUnavailable(format!("llm runtime {}: {}", context, e))
    }

    async fn post_generate(&self, body: Value) -> Result<String, CoreError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::unavailable("generate", e))?
            .error_for_status()
            .map_err(|e| Self::unavailable("generate", e))?;
        let decoded: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable("generate decode", e))?;
        Ok(decoded.response)
    }
}

#[async_trait]
impl LlmRuntime for HttpLlmRuntime {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &SamplingOptions,
    ) -> Result<String, CoreError> {
        self.post_generate(json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        }))
        .await
    }

    async fn generate_structured(
        &self,
        model: &str,
        prompt: &str,
        schema: &Schema,
        options: &SamplingOptions,
        retries: u32,
    ) -> Result<Value, CoreError> {
        // The runtime constrains decoding to JSON; validation against the
        // schema still happens here.
        let prompt = format!("{}\n\n{}", prompt, schema.prompt_hint());
        let mut last_error = String::new();
        for _ in 0..=retries {
            let text = self
                .post_generate(json!({
                    "model": model,
                    "prompt": prompt,
                    "stream": false,
                    "format": "json",
                    "options": {
                        "temperature": options.temperature,
                        "num_predict": options.max_tokens,
                    },
                }))
                .await?;
            match crate::llm::extract_json(&text) {
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

    async fn list_models(&self) -> Result<Vec<ModelInfo>, CoreError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .map_err(|e| Self::unavailable("tags", e))?
            .error_for_status()
            .map_err(|e| Self::unavailable("tags", e))?;
        let decoded: TagsResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable("tags decode", e))?;
        Ok(decoded
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name,
                size_bytes: m.size,
            })
            .collect())
    }

    async fn embeddings(&self, model: &str, text: &str) -> Result<Vec<f32>, CoreError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .json(&json!({"model": model, "prompt": text}))
            .send()
            .await
            .map_err(|e| Self::unavailable("embeddings", e))?
            .error_for_status()
            .map_err(|e| Self::unavailable("embeddings", e))?;
        let decoded: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable("embeddings decode", e))?;
        if decoded.embedding.is_empty() {
            return Err(CoreError::UpstreamUnavailable(
                "llm runtime returned an empty embedding".into(),
            ));
        }
        Ok(decoded.embedding)
    }
}
