//! Live log streaming, independent of any transport.
//!
//! [`LogStreamAdapter::stream`] subscribes to the memory sink, replays up to
//! [`REPLAY_LIMIT`] matching historical events, then follows new events. The
//! subscription callback only forwards into an unbounded channel, so it
//! never blocks the emitting thread. Turning an event into an SSE frame is
//! `stream_event::to_sse_frame` over [`LogEvent::to_value`] — a pure
//! function, deliberately not part of this adapter.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::logfab::manager::LogManager;
use crate::logfab::memory_sink::MemorySink;
use crate::logfab::models::{LogEvent, LogFilter};

/// Historical events replayed before following live ones.
pub const REPLAY_LIMIT: usize = 100;

pub struct LogStreamAdapter {
    memory: Arc<MemorySink>,
}

impl LogStreamAdapter {
    /// Fails when the manager was built without a memory sink.
    pub fn new(manager: &LogManager) -> Result<Self, CoreError> {
        let memory = manager.memory_sink().ok_or_else(|| {
            CoreError::InternalInvariant(
                "log stream adapter requires a memory sink; enable it in the log fabric config"
                    .into(),
            )
        })?;
        Ok(Self { memory })
    }

    /// A stream of matching events: history first, then live follow. The
    /// subscription is dropped when the returned stream is dropped.
    pub fn stream(&self, filter: LogFilter) -> LogEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let live_filter = filter.clone();
        let subscription_id = self.memory.subscribe(Box::new(move |event| {
            if live_filter.matches(event) {
                let _ = tx.send(event.clone());
            }
        }));
        let history: VecDeque<LogEvent> = self.memory.events(&filter, REPLAY_LIMIT).into();
        LogEventStream {
            history,
            rx,
            memory: Arc::clone(&self.memory),
            subscription_id,
        }
    }
}

/// Replay-then-follow stream of [`LogEvent`]s. Unsubscribes on drop.
pub struct LogEventStream {
    history: VecDeque<LogEvent>,
    rx: mpsc::UnboundedReceiver<LogEvent>,
    memory: Arc<MemorySink>,
    subscription_id: u64,
}

impl Stream for LogEventStream {
    type Item = LogEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.history.pop_front() {
            return Poll::Ready(Some(event));
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for LogEventStream {
    fn drop(&mut self) {
        self.memory.unsubscribe(self.subscription_id);
    }
}
