//! Protocol-level event types (type + payload).
//!
//! Result- and metric-carrying variants use `serde_json::Value`; the workflow
//! engine serializes its own state into that before emitting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types that terminate a stream. Exactly one of these is the last
/// event a subscriber receives; nothing follows it.
pub const TERMINAL_EVENT_TYPES: [&str; 2] = ["final_result", "error"];

/// Wire shape for one stream event. `type` is the serde tag; the envelope
/// (task_id, event_id) is applied separately via [`crate::Envelope`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    StageStart {
        stage: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    StageEnd {
        stage: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Log {
        level: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
    ToolCallStart {
        id: String,
        name: String,
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        input_preview: String,
    },
    ToolCallEnd {
        id: String,
        name: String,
        status: String,
        duration_ms: f64,
        output_preview: String,
    },
    FinalResult {
        task_id: String,
        result: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        metrics: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl StreamEvent {
    /// The wire `type` tag of this event.
    pub fn type_name(&self) -> &'static str {
        match self {
            StreamEvent::StageStart { .. } => "stage_start",
            StreamEvent::StageEnd { .. } => "stage_end",
            StreamEvent::Log { .. } => "log",
            StreamEvent::ToolCallStart { .. } => "tool_call_start",
            StreamEvent::ToolCallEnd { .. } => "tool_call_end",
            StreamEvent::FinalResult { .. } => "final_result",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// True for `final_result` and `error`: the stream ends after this event.
    pub fn is_terminal(&self) -> bool {
        TERMINAL_EVENT_TYPES.contains(&self.type_name())
    }

    /// True for events a backpressured subscriber may lose (`log`,
    /// `tool_call_*`). `stage_*` and terminal events are never dropped.
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            StreamEvent::Log { .. }
                | StreamEvent::ToolCallStart { .. }
                | StreamEvent::ToolCallEnd { .. }
        )
    }

    /// Stage name carried by this event, when applicable.
    pub fn stage(&self) -> Option<&str> {
        match self {
            StreamEvent::StageStart { stage, .. } | StreamEvent::StageEnd { stage, .. } => {
                Some(stage.as_str())
            }
            StreamEvent::Log { stage, .. } | StreamEvent::ToolCallStart { stage, .. } => {
                stage.as_deref()
            }
            _ => None,
        }
    }

    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_start_format() {
        let ev = StreamEvent::StageStart {
            stage: "planning".to_string(),
            message: None,
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["type"], "stage_start");
        assert_eq!(v["stage"], "planning");
        assert!(v.get("message").is_none());
    }

    #[test]
    fn stage_end_carries_result() {
        let ev = StreamEvent::StageEnd {
            stage: "validation".to_string(),
            message: Some("done".to_string()),
            result: Some(json!({"all_passed": true})),
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["type"], "stage_end");
        assert_eq!(v["result"]["all_passed"], true);
    }

    #[test]
    fn terminal_classification() {
        let fin = StreamEvent::FinalResult {
            task_id: "t".into(),
            result: json!({}),
            metrics: None,
            conversation_id: None,
        };
        let err = StreamEvent::Error {
            kind: "invalid_request".into(),
            message: "bad".into(),
        };
        let log = StreamEvent::Log {
            level: "INFO".into(),
            message: "m".into(),
            stage: None,
        };
        assert!(fin.is_terminal());
        assert!(err.is_terminal());
        assert!(!log.is_terminal());
        assert!(log.is_droppable());
        assert!(!fin.is_droppable());
    }

    #[test]
    fn round_trip_through_json() {
        let ev = StreamEvent::ToolCallEnd {
            id: "call-1".into(),
            name: "generate".into(),
            status: "success".into(),
            duration_ms: 12.5,
            output_preview: "ok".into(),
        };
        let v = ev.to_value().unwrap();
        let back: StreamEvent = serde_json::from_value(v).unwrap();
        match back {
            StreamEvent::ToolCallEnd { id, status, .. } => {
                assert_eq!(id, "call-1");
                assert_eq!(status, "success");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
