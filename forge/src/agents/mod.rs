//! # Stage agents
//!
//! Prompt builders and answer parsers for each workflow stage. Agents are
//! deliberately thin: the engine owns the LLM calls (so tracing, retries,
//! and the governor wrap every call uniformly), and these modules own what
//! goes into a prompt and how the answer is read back. Prompt craft is not
//! the point here — the shapes and parsers are.

pub mod analyze;
pub mod chat;
pub mod coder;
pub mod critic;
pub mod debugger;
pub mod planner;
pub mod researcher;
pub mod reflection;
pub mod tester;
