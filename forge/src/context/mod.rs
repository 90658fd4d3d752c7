//! # Context engine: chunk, rank, compose
//!
//! Builds prompt-sized context windows from a codebase:
//! [`CodeChunker`] splits files along class/function boundaries,
//! [`RelevanceScorer`] ranks chunks BM25-style against the query, and
//! [`ContextComposer`] packs the ranked chunks into the token budget.
//! [`ContextEngine`] ties them together with a process-wide index cache
//! keyed on project identity.

mod chunker;
mod composer;
mod engine;
mod scorer;

pub use chunker::{ChunkKind, CodeChunk, CodeChunker, CHARS_PER_TOKEN};
pub use composer::ContextComposer;
pub use engine::{ContextEngine, ProjectIndex};
pub use scorer::{RelevanceScorer, ScoredChunk};
