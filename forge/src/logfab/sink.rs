//! Sink contract. Sinks must be lock-safe and must never panic the caller;
//! the manager additionally catches emit errors so one broken sink cannot
//! take the fabric down.

use thiserror::Error;

use crate::logfab::models::LogEvent;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink: {0}")]
    Other(String),
}

pub trait LogSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError>;
}
