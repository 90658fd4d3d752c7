//! Envelope (task_id, event_id) applied to each event on a stream.
//! EnvelopeState tracks the per-stream sequence and injects both fields.

use crate::event::StreamEvent;
use serde_json::Value;

/// Envelope fields stamped onto each serialized event.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Task ID; constant within one stream.
    pub task_id: Option<String>,
    /// Per-event sequence number; monotonically increasing within a stream.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.task_id {
            obj.entry("task_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Envelope state for one stream: task_id plus the next event_id.
pub struct EnvelopeState {
    pub task_id: String,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(task_id: String) -> Self {
        Self {
            task_id,
            next_event_id: 1,
        }
    }

    /// Injects the envelope into the event value and advances the sequence.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = Envelope::new()
            .with_task_id(&self.task_id)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }

    /// Serializes an event and stamps the envelope in one step.
    pub fn to_json(&mut self, event: &StreamEvent) -> Result<Value, serde_json::Error> {
        let mut value = event.to_value()?;
        self.inject_into(&mut value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_inject_does_not_overwrite() {
        let mut obj = json!({"type":"stage_start","stage":"intent","task_id":"keep"});
        let env = Envelope::new().with_task_id("t-1").with_event_id(7);
        env.inject_into(&mut obj);
        assert_eq!(obj["task_id"], "keep");
        assert_eq!(obj["event_id"], 7);
    }

    #[test]
    fn sequence_advances_per_event() {
        let mut state = EnvelopeState::new("task-9".to_string());
        let ev = StreamEvent::StageStart {
            stage: "intent".into(),
            message: None,
        };
        let first = state.to_json(&ev).unwrap();
        let second = state.to_json(&ev).unwrap();
        assert_eq!(first["task_id"], "task-9");
        assert_eq!(first["event_id"], 1);
        assert_eq!(second["event_id"], 2);
    }
}
