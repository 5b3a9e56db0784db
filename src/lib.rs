//! # StreamBridge
//!
//! Bridges push-based producers to a request/response lifecycle.
//!
//! A producer emits values, then completes or fails, possibly from its own
//! thread and possibly forever. A request handler wants either one answer or
//! a stream of server-sent events, and it has its own timeout and its own
//! client that may go away. StreamBridge joins the two with exactly-once
//! completion and teardown on every exit path.
//!
//! ## Key Features
//!
//! - **Exactly-once termination**: completion, failure and cancellation race
//!   on one gate; the first wins and no value is delivered after it
//! - **Two delivery policies**: aggregate the whole sequence into a deferred
//!   result, or forward each value as a server-sent event
//! - **Non-blocking streaming**: a full or closed event channel cancels the
//!   upstream subscription instead of blocking the producer
//! - **Lifecycle wiring**: deferred result timeouts, emitter timeouts and
//!   client disconnects cancel the subscription
//!
//! ## Quick Start
//!
//! ```rust
//! use streambridge::config::{BridgeConfig, DeliveryMode};
//! use streambridge::producers::IterProducer;
//! use streambridge::response::ObservableResponse;
//! use streambridge::StringError;
//!
//! # fn main() -> Result<(), streambridge::BridgeError> {
//! let producer = IterProducer::<Vec<Result<i32, StringError>>>::from_values(vec![1, 2, 3]);
//! let response = ObservableResponse::attach(producer, DeliveryMode::Aggregating, &BridgeConfig::default())?;
//! assert_eq!(response.mode(), DeliveryMode::Aggregating);
//! # Ok(())
//! # }
//! ```
//!
//! ## Building Blocks
//!
//! - [`Producer`] and [`Observer`]: the push-based sequence contract
//! - [`SubscriptionHandle`]: releases a producer's resources, at most once
//! - [`StreamSubscriber`]: the observer that enforces the guarantees above
//! - [`sinks`]: the aggregating and streaming delivery policies
//! - [`deferred::DeferredResult`] and [`emitter::SseEmitter`]: the response
//!   primitives the sinks complete

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Configuration for delivery modes, deferred results and emitters.
pub mod config;
/// Single-shot deferred result with timeout.
pub mod deferred;
/// Server-sent event framing and the SSE emitter.
pub mod emitter;
/// Error types.
pub mod error;
/// Exactly-once terminal gate.
pub mod gate;
/// Observer trait.
pub mod observer;
/// Producer trait.
pub mod producer;
/// Producer adapters.
pub mod producers;
/// Request-facing wrappers that attach a producer to a response.
pub mod response;
/// Response sink trait.
pub mod sink;
/// Response sink implementations.
pub mod sinks;
/// Stream subscriber.
pub mod subscriber;
/// Subscription handle.
pub mod subscription;


pub use config::{BridgeConfig, DeferredConfig, DeliveryMode, EmitterConfig};
pub use deferred::{CompletionSlot, DeferredOutcome, DeferredResult};
pub use emitter::{EventChannel, Frame, SseEmitter, SseEvent};
pub use error::{BridgeError, ComponentInfo, StringError, WriteError};
pub use gate::{GateState, TerminalGate};
pub use observer::Observer;
pub use producer::Producer;
pub use response::{ObservableDeferredResult, ObservableResponse, ObservableSseEmitter};
pub use sink::ResponseSink;
pub use sinks::{AggregatingSink, StreamingSink};
pub use subscriber::StreamSubscriber;
pub use subscription::SubscriptionHandle;
