//! Bounded in-memory ring of recent events, with per-event subscriber
//! callbacks for live streaming.
//!
//! Callbacks are delivered under the subscriber lock; handlers must not
//! re-enter the sink from the callback. Handlers that do non-trivial work
//! should hand the event off to their own queue (the stream adapter does).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::logfab::models::{LogEvent, LogFilter};
use crate::logfab::sink::{LogSink, SinkError};

pub type SubscriberFn = Box<dyn Fn(&LogEvent) + Send + Sync>;

pub struct MemorySink {
    ring: Mutex<RingState>,
    subscribers: Mutex<HashMap<u64, SubscriberFn>>,
    next_id: AtomicU64,
}

struct RingState {
    events: VecDeque<LogEvent>,
    max_events: usize,
}

impl MemorySink {
    pub fn new(max_events: usize) -> Self {
        Self {
            ring: Mutex::new(RingState {
                events: VecDeque::new(),
                max_events: max_events.max(1),
            }),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback for every subsequent event; returns the id to
    /// pass to [`MemorySink::unsubscribe`].
    pub fn subscribe(&self, callback: SubscriberFn) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .insert(id, callback);
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .remove(&id);
    }

    /// Most recent events matching `filter`, oldest first, at most `limit`.
    pub fn events(&self, filter: &LogFilter, limit: usize) -> Vec<LogEvent> {
        let ring = self.ring.lock().expect("ring lock poisoned");
        let mut matched: Vec<LogEvent> = ring
            .events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    pub fn len(&self) -> usize {
        self.ring.lock().expect("ring lock poisoned").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError> {
        {
            let mut ring = self
                .ring
                .lock()
                .map_err(|_| SinkError::Other("ring lock poisoned".into()))?;
            if ring.events.len() >= ring.max_events {
                ring.events.pop_front();
            }
            ring.events.push_back(event.clone());
        }
        let subscribers = self
            .subscribers
            .lock()
            .map_err(|_| SinkError::Other("subscriber lock poisoned".into()))?;
        for callback in subscribers.values() {
            callback(event);
        }
        Ok(())
    }
}
