//! # Stream emitter: ordered, paced, back-pressured event delivery
//!
//! One channel per request. The emitter side is synchronous and never
//! blocks workflow progress: events enter a bounded queue, and when the
//! queue is full the oldest droppable event (`log`, `tool_call_*`) is
//! coalesced away — `stage_*` and terminal events are never lost. Drops are
//! reported as one synthesized WARNING log right before the terminal event.
//!
//! The receiver side paces delivery: an advisory delay between consecutive
//! envelopes (shorter for terminal events) lets thin UI clients render
//! incremental progress. Order is strictly FIFO per request; exactly one
//! terminal event (`final_result` or `error`) ends the stream, and nothing
//! follows it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use stream_event::StreamEvent;
use tokio::sync::Notify;

#[derive(Clone, Copy, Debug)]
pub struct PacingConfig {
    pub default_delay: Duration,
    pub critical_delay: Duration,
    pub capacity: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_millis(50),
            critical_delay: Duration::from_millis(10),
            capacity: 256,
        }
    }
}

impl PacingConfig {
    pub fn from_settings(s: &env_config::PacingSettings) -> Self {
        Self {
            default_delay: Duration::from_millis(s.default_delay_ms),
            critical_delay: Duration::from_millis(s.critical_delay_ms),
            capacity: s.queue_capacity.max(8),
        }
    }

    /// No pacing and a large queue, for tests.
    pub fn immediate() -> Self {
        Self {
            default_delay: Duration::ZERO,
            critical_delay: Duration::ZERO,
            capacity: 4096,
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<StreamEvent>>,
    notify: Notify,
    receiver_gone: AtomicBool,
    terminal_sent: AtomicBool,
    dropped: AtomicU64,
    capacity: usize,
}

/// Emitting half; cheap to clone, synchronous, never blocks.
#[derive(Clone)]
pub struct StreamEmitter {
    shared: Arc<Shared>,
}

/// Receiving half; paces delivery and ends after the terminal event.
pub struct EventStream {
    shared: Arc<Shared>,
    pacing: PacingConfig,
    delivered_any: bool,
}

/// One stream channel for one request.
pub fn stream_channel(pacing: PacingConfig) -> (StreamEmitter, EventStream) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        notify: Notify::new(),
        receiver_gone: AtomicBool::new(false),
        terminal_sent: AtomicBool::new(false),
        dropped: AtomicU64::new(0),
        capacity: pacing.capacity,
    });
    (
        StreamEmitter {
            shared: Arc::clone(&shared),
        },
        EventStream {
            shared,
            pacing,
            delivered_any: false,
        },
    )
}

impl StreamEmitter {
    /// True once the subscriber abandoned the stream. The engine checks this
    /// at stage boundaries and stops scheduling further stages.
    pub fn is_closed(&self) -> bool {
        self.shared.receiver_gone.load(Ordering::SeqCst)
            || self.shared.terminal_sent.load(Ordering::SeqCst)
    }

    fn push(&self, event: StreamEvent) {
        self.push_inner(event, false);
    }

    fn push_inner(&self, event: StreamEvent, force: bool) {
        if self.shared.terminal_sent.load(Ordering::SeqCst) {
            return;
        }
        let terminal = event.is_terminal();
        {
            let mut queue = self.shared.queue.lock().expect("stream queue poisoned");
            if queue.len() >= self.shared.capacity {
                if !force && event.is_droppable() {
                    self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                // make room by coalescing the oldest droppable event;
                // forced events may exceed the bound briefly
                if let Some(pos) = queue.iter().position(|e| e.is_droppable()) {
                    queue.remove(pos);
                    self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                }
            }
            queue.push_back(event);
        }
        if terminal {
            self.shared.terminal_sent.store(true, Ordering::SeqCst);
        }
        self.shared.notify.notify_one();
    }

    fn push_terminal(&self, event: StreamEvent) {
        let dropped = self.shared.dropped.swap(0, Ordering::SeqCst);
        if dropped > 0 {
            // the notice itself must survive the pressure that caused it
            self.push_inner(
                StreamEvent::Log {
                    level: "WARNING".to_string(),
                    message: format!(
                        "{} informational events were dropped under back-pressure",
                        dropped
                    ),
                    stage: None,
                },
                true,
            );
        }
        self.push_inner(event, true);
    }

    pub fn emit_stage_start(&self, stage: &str, message: Option<&str>) {
        self.push(StreamEvent::StageStart {
            stage: stage.to_string(),
            message: message.map(str::to_string),
        });
    }

    pub fn emit_stage_end(&self, stage: &str, message: Option<&str>, result: Option<Value>) {
        self.push(StreamEvent::StageEnd {
            stage: stage.to_string(),
            message: message.map(str::to_string),
            result,
        });
    }

    pub fn emit_log(&self, level: &str, message: &str, stage: Option<&str>) {
        self.push(StreamEvent::Log {
            level: level.to_string(),
            message: message.to_string(),
            stage: stage.map(str::to_string),
        });
    }

    pub fn emit_tool_call_start(
        &self,
        id: &str,
        name: &str,
        kind: &str,
        stage: Option<&str>,
        input_preview: &str,
    ) {
        self.push(StreamEvent::ToolCallStart {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            stage: stage.map(str::to_string),
            input_preview: input_preview.to_string(),
        });
    }

    pub fn emit_tool_call_end(
        &self,
        id: &str,
        name: &str,
        status: &str,
        duration_ms: f64,
        output_preview: &str,
    ) {
        self.push(StreamEvent::ToolCallEnd {
            id: id.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            duration_ms,
            output_preview: output_preview.to_string(),
        });
    }

    pub fn emit_error(&self, kind: &str, message: &str) {
        self.push_terminal(StreamEvent::Error {
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }

    pub fn emit_final(
        &self,
        task_id: &str,
        result: Value,
        metrics: Option<Value>,
        conversation_id: Option<&str>,
    ) {
        self.push_terminal(StreamEvent::FinalResult {
            task_id: task_id.to_string(),
            result,
            metrics,
            conversation_id: conversation_id.map(str::to_string),
        });
    }
}

impl EventStream {
    /// Next event in FIFO order, `None` after the terminal event. Applies
    /// the advisory pacing delay between consecutive envelopes.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        loop {
            let event = {
                let mut queue = self.shared.queue.lock().expect("stream queue poisoned");
                queue.pop_front()
            };
            if let Some(event) = event {
                if self.delivered_any {
                    let delay = if event.is_terminal() {
                        self.pacing.critical_delay
                    } else {
                        self.pacing.default_delay
                    };
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                self.delivered_any = true;
                return Some(event);
            }
            if self.shared.terminal_sent.load(Ordering::SeqCst) {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Collects every remaining event, for tests.
    pub async fn collect_all(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    /// Adapts this receiver into a `futures::Stream`.
    pub fn into_stream(self) -> impl futures::Stream<Item = StreamEvent> + Send {
        futures::stream::unfold(self, |mut rx| async move {
            rx.next().await.map(|event| (event, rx))
        })
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.shared.receiver_gone.store(true, Ordering::SeqCst);
    }
}
