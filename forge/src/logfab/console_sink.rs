//! Human-oriented console sink with level markers.

use std::io::Write;
use std::sync::Mutex;

use crate::logfab::models::{LogEvent, LogLevel};
use crate::logfab::sink::{LogSink, SinkError};

pub struct ConsoleSink {
    // Serializes whole lines; interleaved writes from parallel workflows are
    // unreadable otherwise.
    guard: Mutex<()>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            guard: Mutex::new(()),
        }
    }

    fn marker(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Debug => "··",
            LogLevel::Info => "✔ ",
            LogLevel::Warning => "⚠ ",
            LogLevel::Error => "✖ ",
        }
    }

    fn format(event: &LogEvent) -> String {
        let mut tag = event.source.as_str().to_string();
        if let Some(ref stage) = event.stage {
            tag.push('/');
            tag.push_str(stage);
        }
        format!(
            "{} {} {:7} [{}] {}",
            Self::marker(event.level),
            event.timestamp.format("%H:%M:%S"),
            event.level.as_str(),
            tag,
            event.message
        )
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError> {
        let line = Self::format(event);
        let _guard = self
            .guard
            .lock()
            .map_err(|_| SinkError::Other("console lock poisoned".into()))?;
        if event.level >= LogLevel::Warning {
            writeln!(std::io::stderr(), "{}", line)?;
        } else {
            writeln!(std::io::stdout(), "{}", line)?;
        }
        Ok(())
    }
}
