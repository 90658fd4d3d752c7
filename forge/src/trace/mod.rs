//! Under-the-hood trace of LLM and tool calls.
//!
//! Call sites open an explicit [`ToolCallScope`] around each gateway or
//! validator invocation — no decorator magic. Records land in a bounded
//! ring for the admin UI, and mirror onto the request's stream emitter as
//! `tool_call_start`/`tool_call_end` events when one is attached. The
//! enable flag comes from `[debug] under_the_hood_enabled` and is read per
//! scope, so flipping it live takes effect immediately.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::stream::StreamEmitter;

const PREVIEW_CHARS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallKind {
    Llm,
    Validation,
    Search,
    File,
}

impl ToolCallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCallKind::Llm => "llm",
            ToolCallKind::Validation => "validation",
            ToolCallKind::Search => "search",
            ToolCallKind::File => "file",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub kind: ToolCallKind,
    pub name: String,
    pub stage: Option<String>,
    pub input_preview: String,
    pub output_preview: String,
    pub status: String,
    pub duration_ms: f64,
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

pub struct TraceHub {
    records: Mutex<VecDeque<ToolCallRecord>>,
    max_records: usize,
}

impl TraceHub {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    /// Opens a scope when tracing is enabled; `None` otherwise, which makes
    /// the whole path free when the flag is off.
    pub fn scope(
        self: &Arc<Self>,
        enabled: bool,
        kind: ToolCallKind,
        name: &str,
        stage: Option<&str>,
        input: &str,
        emitter: Option<StreamEmitter>,
    ) -> Option<ToolCallScope> {
        if !enabled {
            return None;
        }
        let id = Uuid::new_v4().to_string();
        if let Some(ref emitter) = emitter {
            emitter.emit_tool_call_start(
                &id,
                name,
                kind.as_str(),
                stage,
                &preview(input),
            );
        }
        Some(ToolCallScope {
            hub: Arc::clone(self),
            id,
            kind,
            name: name.to_string(),
            stage: stage.map(str::to_string),
            input_preview: preview(input),
            started: Instant::now(),
            emitter,
        })
    }

    /// Most recent records, newest last.
    pub fn recent(&self, limit: usize) -> Vec<ToolCallRecord> {
        let records = self.records.lock().expect("trace lock poisoned");
        records
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .rev()
            .collect()
    }

    fn push(&self, record: ToolCallRecord) {
        let mut records = self.records.lock().expect("trace lock poisoned");
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record);
    }
}

/// One open tool call. Finish it with [`ToolCallScope::finish`]; dropping
/// without finishing records an `abandoned` status.
pub struct ToolCallScope {
    hub: Arc<TraceHub>,
    id: String,
    kind: ToolCallKind,
    name: String,
    stage: Option<String>,
    input_preview: String,
    started: Instant,
    emitter: Option<StreamEmitter>,
}

impl ToolCallScope {
    pub fn finish(mut self, success: bool, output: &str) {
        self.record(if success { "success" } else { "error" }, output);
    }

    fn record(&mut self, status: &str, output: &str) {
        let record = ToolCallRecord {
            id: self.id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            stage: self.stage.take(),
            input_preview: std::mem::take(&mut self.input_preview),
            output_preview: preview(output),
            status: status.to_string(),
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        };
        if let Some(emitter) = self.emitter.take() {
            emitter.emit_tool_call_end(
                &record.id,
                &record.name,
                &record.status,
                record.duration_ms,
                &record.output_preview,
            );
        }
        self.hub.push(record);
    }
}

impl Drop for ToolCallScope {
    fn drop(&mut self) {
        if self.emitter.is_some() || !self.input_preview.is_empty() {
            self.record("abandoned", "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_scope_is_free() {
        let hub = Arc::new(TraceHub::new(10));
        assert!(hub
            .scope(false, ToolCallKind::Llm, "generate", None, "prompt", None)
            .is_none());
        assert!(hub.recent(10).is_empty());
    }

    #[test]
    fn finished_scope_records_duration_and_previews() {
        let hub = Arc::new(TraceHub::new(10));
        let scope = hub
            .scope(true, ToolCallKind::Llm, "generate", Some("coding"), "write code", None)
            .unwrap();
        scope.finish(true, "fn main() {}");
        let records = hub.recent(10);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "success");
        assert_eq!(records[0].stage.as_deref(), Some("coding"));
        assert_eq!(records[0].output_preview, "fn main() {}");
        assert!(records[0].duration_ms >= 0.0);
    }

    #[test]
    fn dropped_scope_records_abandoned() {
        let hub = Arc::new(TraceHub::new(10));
        {
            let _scope = hub
                .scope(true, ToolCallKind::Search, "web", None, "query", None)
                .unwrap();
        }
        let records = hub.recent(10);
        assert_eq!(records[0].status, "abandoned");
    }

    #[test]
    fn ring_is_bounded() {
        let hub = Arc::new(TraceHub::new(2));
        for i in 0..4 {
            hub.scope(true, ToolCallKind::Llm, &format!("call{}", i), None, "in", None)
                .unwrap()
                .finish(true, "out");
        }
        let records = hub.recent(10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "call3");
    }

    #[test]
    fn long_previews_are_truncated() {
        let hub = Arc::new(TraceHub::new(4));
        let long_input = "x".repeat(2000);
        hub.scope(true, ToolCallKind::Llm, "generate", None, &long_input, None)
            .unwrap()
            .finish(true, &long_input);
        let records = hub.recent(1);
        assert_eq!(records[0].input_preview.len(), PREVIEW_CHARS);
        assert_eq!(records[0].output_preview.len(), PREVIEW_CHARS);
    }
}
