//! # Log fabric: typed events, pluggable sinks, live subscription
//!
//! One [`LogManager`] multicasts each [`LogEvent`] to the configured sinks:
//!
//! | Sink | Purpose |
//! |------|---------|
//! | [`FileSink`] | JSONL with size-based rotation and N backups |
//! | [`ConsoleSink`] | Human-friendly lines with level markers |
//! | [`MemorySink`] | Bounded ring + per-event callbacks for subscribers |
//!
//! [`LogStreamAdapter`] bridges the memory sink to an async stream for live
//! UIs, replaying recent history before following. The fabric knows nothing
//! about HTTP; SSE framing is a pure function in the `stream-event` crate.

mod console_sink;
mod file_sink;
mod manager;
mod memory_sink;
mod models;
mod sink;
mod stream_adapter;

pub use console_sink::ConsoleSink;
pub use file_sink::FileSink;
pub use manager::{LogFabricConfig, LogManager};
pub use memory_sink::MemorySink;
pub use models::{LogEvent, LogFilter, LogLevel, LogSource};
pub use sink::{LogSink, SinkError};
pub use stream_adapter::{LogEventStream, LogStreamAdapter, REPLAY_LIMIT};
