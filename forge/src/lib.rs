//! # Forge
//!
//! Core of a local multi-agent code-generation service: a request is
//! validated, classified by intent, routed to one of three modes (dialog,
//! project analysis, or the full generate-test-validate-reflect workflow),
//! and executed against a local LLM runtime, with progress streaming to the
//! caller as typed events.
//!
//! ## Main modules
//!
//! - [`workflow`]: [`WorkflowEngine`], [`Stage`], the transition table —
//!   the staged pipeline with its debug/fix and reflection loops.
//! - [`stream`]: [`StreamEmitter`] / [`EventStream`] — ordered, paced,
//!   back-pressured event delivery per request.
//! - [`governor`]: [`ResourceGovernor`] — bounded concurrency over agent
//!   calls with scoped [`Lease`]s.
//! - [`memory`]: [`ConversationMemory`] (summarizing dialog history) and
//!   [`TaskExperienceMemory`] (similarity-indexed task outcomes).
//! - [`context`]: [`ContextEngine`] — chunk, rank, and compose code
//!   context within a token budget.
//! - [`llm`]: [`LlmRuntime`] gateway, schema-validated structured output,
//!   and the fallback helper.
//! - [`router`] / [`intent`]: request classification and mode selection.
//! - [`logfab`]: typed log events, file/console/memory sinks, and the live
//!   [`LogStreamAdapter`].
//! - [`validators`], [`paths`], [`dbadmin`], [`trace`], [`websearch`]:
//!   external validators, the path guard, store administration, the
//!   under-the-hood trace, and the search provider contract.
//!
//! The composition root is [`ServiceContext`]: it owns what the original
//! service kept as singletons and hands them to request handlers
//! explicitly.

pub mod agents;
pub mod context;
pub mod dbadmin;
pub mod error;
pub mod governor;
pub mod intent;
pub mod llm;
pub mod logfab;
pub mod memory;
pub mod paths;
pub mod request;
pub mod retry;
pub mod router;
pub mod service;
pub mod stream;
pub mod trace;
pub mod validators;
pub mod websearch;
pub mod workflow;

pub use context::{CodeChunk, ContextEngine, RelevanceScorer, ScoredChunk};
pub use error::CoreError;
pub use governor::{GovernorStats, Lease, ResourceGovernor};
pub use intent::{Complexity, IntentClassifier, IntentKind, IntentResult, Mode};
pub use llm::{
    generate_with_fallback, HttpLlmRuntime, LlmRuntime, MockLlm, SamplingOptions, Schema,
};
pub use logfab::{LogEvent, LogFabricConfig, LogFilter, LogLevel, LogManager, LogStreamAdapter};
pub use memory::{
    ChatTurn, Conversation, ConversationMemory, ConversationMemoryConfig, Role, StageScores,
    TaskExperience, TaskExperienceMemory, VectorStore,
};
pub use request::{FeedbackRequest, ModeHint, TaskRequest};
pub use router::{ModeDecision, ModeRouter};
pub use service::{ModelRole, ServiceContext, ServiceContextBuilder};
pub use stream::{stream_channel, EventStream, PacingConfig, StreamEmitter};
pub use trace::{ToolCallKind, ToolCallRecord, TraceHub};
pub use validators::{CodeValidator, CommandValidator, ValidationReport, ValidatorStatus};
pub use websearch::{HttpWebSearch, SearchResult, WebSearch};
pub use workflow::{next_stage, Stage, WorkflowEngine, WorkflowState};
