//! Structured-output helper: feature-flagged structured decoding with a
//! fallback to manual parsing.
//!
//! Flags are read from the settings snapshot passed in per call, never
//! captured at startup, so an admin can flip `[structured_output]` live.
//! The fallback is a single async-capable callable; sync fallbacks just
//! wrap their value in a ready future.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CoreError;
use crate::llm::schema::Schema;
use crate::llm::{LlmRuntime, SamplingOptions};

/// Whether structured output applies globally and for this agent.
pub fn is_structured_output_enabled(
    agent_name: &str,
    settings: &env_config::StructuredOutputSettings,
) -> bool {
    settings.enabled && settings.enabled_agents.iter().any(|a| a == agent_name)
}

/// Structured generation with fallback, deserialized into `T`.
///
/// 1. Disabled for this agent → `fallback` directly.
/// 2. Enabled → `generate_structured`; a `StructuredOutput` failure (schema
///    validation exhausted, or the value does not fit `T`) consults
///    `fallback_to_manual_parsing`: fallback when allowed, propagate
///    otherwise. Transport errors always propagate.
#[allow(clippy::too_many_arguments)]
pub async fn generate_with_fallback<T, Fut>(
    llm: &dyn LlmRuntime,
    model: &str,
    prompt: &str,
    schema: &Schema,
    options: &SamplingOptions,
    agent_name: &str,
    settings: &env_config::StructuredOutputSettings,
    fallback: impl FnOnce() -> Fut + Send,
) -> Result<T, CoreError>
where
    T: DeserializeOwned,
    Fut: Future<Output = Result<T, CoreError>> + Send,
{
    if !is_structured_output_enabled(agent_name, settings) {
        return fallback().await;
    }

    let structured: Result<Value, CoreError> = llm
        .generate_structured(model, prompt, schema, options, 2)
        .await;
    let failure = match structured {
        Ok(value) => match serde_json::from_value::<T>(value) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => CoreError::StructuredOutput(format!("{}: {}", schema.name, e)),
        },
        Err(e @ CoreError::StructuredOutput(_)) => e,
        Err(other) => return Err(other),
    };

    if settings.fallback_to_manual_parsing {
        tracing::warn!(agent = agent_name, error = %failure, "structured output failed, using fallback parser");
        fallback().await
    } else {
        Err(failure)
    }
}
