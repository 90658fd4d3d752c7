//! SSE framing for serialized events.
//!
//! Framing lives here so the log fabric and the workflow emitter can share
//! one formatter without either depending on an HTTP stack.

use serde_json::Value;

/// Renders one `text/event-stream` frame from a serialized event.
///
/// The `event:` field is taken from the value's `type` key ("message" when
/// absent); the data line is the compact JSON body. The returned string ends
/// with the blank line that terminates an SSE frame.
pub fn to_sse_frame(value: &Value) -> String {
    let event_type = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("message");
    format!("event: {}\ndata: {}\n\n", event_type, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_has_event_and_data_lines() {
        let v = json!({"type":"stage_start","stage":"intent"});
        let frame = to_sse_frame(&v);
        assert!(frame.starts_with("event: stage_start\n"));
        assert!(frame.contains("data: {"));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn missing_type_falls_back_to_message() {
        let frame = to_sse_frame(&json!({"x": 1}));
        assert!(frame.starts_with("event: message\n"));
    }
}
