//! # Response Sink Trait
//!
//! A response sink is the consumer-side policy a
//! [`StreamSubscriber`](crate::subscriber::StreamSubscriber) drives. It
//! decides what a value, a completion, or an error means for the response.
//!
//! ## Implementations
//!
//! - [`AggregatingSink`](crate::sinks::AggregatingSink): buffers values and
//!   completes a deferred result with the whole sequence
//! - [`StreamingSink`](crate::sinks::StreamingSink): forwards each value as a
//!   server-sent event
//!
//! The subscriber guarantees that a sink sees at most one terminal call and
//! no value after it, so implementations need no synchronization of their
//! own.

use crate::error::{ComponentInfo, WriteError};

/// Consumer-side delivery policy.
pub trait ResponseSink<T, E>: Send {
  /// Accepts the next value.
  ///
  /// An error means the value could not be delivered. The subscriber then
  /// cancels the subscription and calls [`ResponseSink::abort`]; it never
  /// retries.
  fn on_value(&mut self, value: T) -> Result<(), WriteError>;

  /// The producer completed normally.
  fn on_complete(&mut self);

  /// The producer failed with `error`.
  fn on_error(&mut self, error: E);

  /// Delivery failed and the subscription was cancelled because of it.
  ///
  /// Lets the sink hand the failure to the owner of its output.
  fn abort(&mut self, _error: &WriteError) {}

  /// Returns information about this sink for log records.
  fn component_info(&self) -> ComponentInfo {
    ComponentInfo::of::<Self>(None)
  }
}
