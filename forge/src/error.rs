//! Core error type shared across the service.
//!
//! Kinds map one-to-one onto the user-visible error classes: request
//! validation (400), path containment (403), missing resources (404),
//! unreachable upstreams, structured-output validation, external validator
//! outcomes, and broken internal invariants. Stage code propagates with `?`;
//! the workflow engine decides per kind whether to retry, branch, or emit a
//! terminal `error` event.

use thiserror::Error;

/// Service-wide error. `kind_tag` is the stable discriminant used in
/// terminal `error` stream events.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad request fields: empty text, out-of-range values, forbidden
    /// substrings, malformed paths.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Path resolves outside the project root.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Missing backup, conversation, or collection.
    #[error("not found: {0}")]
    NotFound(String),

    /// LLM runtime, vector store, or web search unreachable or timed out.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Schema validation of a structured LLM response failed after retries.
    #[error("structured output failed: {0}")]
    StructuredOutput(String),

    /// An external validator reported non-success. Not fatal; drives the
    /// debug/fix branch.
    #[error("validator failure: {0}")]
    ValidatorFailure(String),

    /// Unexpected internal state (e.g. a stage missing from the transition
    /// table). Always terminal, always logged at ERROR.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl CoreError {
    /// Stable tag for wire envelopes and logs.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            CoreError::InvalidRequest(_) => "invalid_request",
            CoreError::AccessDenied(_) => "access_denied",
            CoreError::NotFound(_) => "not_found",
            CoreError::UpstreamUnavailable(_) => "upstream_unavailable",
            CoreError::StructuredOutput(_) => "structured_output",
            CoreError::ValidatorFailure(_) => "validator_failure",
            CoreError::InternalInvariant(_) => "internal_invariant",
        }
    }

    /// Whether a bounded retry may recover this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, CoreError::UpstreamUnavailable(_))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::InternalInvariant(format!("io: {}", e))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InternalInvariant(format!("json: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(
            CoreError::InvalidRequest("x".into()).kind_tag(),
            "invalid_request"
        );
        assert_eq!(CoreError::AccessDenied("x".into()).kind_tag(), "access_denied");
        assert_eq!(
            CoreError::UpstreamUnavailable("x".into()).kind_tag(),
            "upstream_unavailable"
        );
    }

    #[test]
    fn only_upstream_is_retriable() {
        assert!(CoreError::UpstreamUnavailable("t".into()).is_retriable());
        assert!(!CoreError::InvalidRequest("t".into()).is_retriable());
        assert!(!CoreError::ValidatorFailure("t".into()).is_retriable());
    }
}
