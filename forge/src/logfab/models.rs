//! Typed log events.
//!
//! A `LogEvent` is data, not formatting: sinks decide how it renders. The
//! payload is a structured JSON map, never a stringified traceback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log severity, ordered DEBUG < INFO < WARNING < ERROR.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parses the uppercase names used in config; unknown input means INFO.
    pub fn parse_or_info(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "WARNING" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Where an event originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Agent,
    System,
    Ui,
    Tool,
    Validator,
    Infrastructure,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Agent => "agent",
            LogSource::System => "system",
            LogSource::Ui => "ui",
            LogSource::Tool => "tool",
            LogSource::Validator => "validator",
            LogSource::Infrastructure => "infrastructure",
        }
    }
}

/// One typed log event. Timestamps are always UTC-aware.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: LogSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            source: LogSource::System,
            stage: None,
            message: message.into(),
            payload: None,
            task_id: None,
            iteration: None,
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn source(mut self, source: LogSource) -> Self {
        self.source = source;
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Null)
    }
}

/// Filter for reading events back (memory sink queries and live streams).
#[derive(Clone, Debug, Default)]
pub struct LogFilter {
    pub task_id: Option<String>,
    pub level: Option<LogLevel>,
    pub source: Option<LogSource>,
    pub stage: Option<String>,
}

impl LogFilter {
    pub fn matches(&self, event: &LogEvent) -> bool {
        if let Some(ref task_id) = self.task_id {
            if event.task_id.as_deref() != Some(task_id.as_str()) {
                return false;
            }
        }
        if let Some(level) = self.level {
            if event.level != level {
                return false;
            }
        }
        if let Some(source) = self.source {
            if event.source != source {
                return false;
            }
        }
        if let Some(ref stage) = self.stage {
            if event.stage.as_deref() != Some(stage.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn serializes_with_uppercase_level_and_lowercase_source() {
        let ev = LogEvent::warning("careful")
            .source(LogSource::Validator)
            .stage("validation")
            .task("t-1");
        let v = ev.to_value();
        assert_eq!(v["level"], "WARNING");
        assert_eq!(v["source"], "validator");
        assert_eq!(v["stage"], "validation");
        assert_eq!(v["task_id"], "t-1");
    }

    #[test]
    fn filter_matches_on_all_dimensions() {
        let ev = LogEvent::info("m")
            .source(LogSource::Agent)
            .stage("coding")
            .task("abc");
        let all = LogFilter {
            task_id: Some("abc".into()),
            level: Some(LogLevel::Info),
            source: Some(LogSource::Agent),
            stage: Some("coding".into()),
        };
        assert!(all.matches(&ev));
        let wrong_task = LogFilter {
            task_id: Some("other".into()),
            ..Default::default()
        };
        assert!(!wrong_task.matches(&ev));
        assert!(LogFilter::default().matches(&ev));
    }

    #[test]
    fn payload_is_structured() {
        let ev = LogEvent::info("m").payload(json!({"attempt": 2}));
        assert_eq!(ev.to_value()["payload"]["attempt"], 2);
    }
}
