//! # Memory: dialog history and task experience
//!
//! Two bounded stores behind one module:
//!
//! 1. [`ConversationMemory`] — dialog history per conversation id, with
//!    LLM-written summarization, TTL eviction, a conversation cap, and
//!    optional one-file-per-conversation persistence.
//! 2. [`TaskExperienceMemory`] — append-only task outcomes in a vector
//!    index ([`VectorStore`] + [`Embedder`]), with similarity retrieval for
//!    planning recommendations and exact-match workflow short-circuits.
//!
//! Both persist across restarts when given directories; everything else in
//! the service is request-scoped.

mod conversation;
mod embedder;
mod experience;
mod vector;

pub use conversation::{
    ChatTurn, CleanupReport, Conversation, ConversationMemory, ConversationMemoryConfig,
    ConversationMessage, Role,
};
pub use embedder::{Embedder, RuntimeEmbedder};
pub use experience::{
    ExperienceMatch, StageScores, TaskExperience, TaskExperienceMemory,
    EXACT_MIN_SUCCESS, EXACT_SIMILARITY_THRESHOLD,
};
pub use vector::{InMemoryVectorStore, VectorQueryHit, VectorStore};
