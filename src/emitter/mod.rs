//! Server-sent event output: framing, the event channel contract, and the
//! tokio-backed emitter.

/// Event channel contract and frames.
pub mod channel;
/// Server-sent event framing.
pub mod event;
/// Bounded, keep-alive aware SSE emitter.
pub mod sse;

pub use channel::{EventChannel, Frame};
pub use event::SseEvent;
pub use sse::SseEmitter;
