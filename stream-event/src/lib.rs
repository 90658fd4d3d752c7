//! Stream event protocol for task runs.
//!
//! Wire shape for one stream event (**type + payload**), the per-stream
//! **envelope** (task_id, event_id), and SSE framing. The crate is
//! transport-agnostic: turning an event into an `axum` response or a raw
//! `text/event-stream` body is the caller's concern; [`to_sse_frame`] is the
//! only formatting helper and it is a pure function.

mod envelope;
mod event;
mod sse;

pub use envelope::{Envelope, EnvelopeState};
pub use event::{StreamEvent, TERMINAL_EVENT_TYPES};
pub use sse::to_sse_frame;
