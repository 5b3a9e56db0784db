//! # Aggregating Sink
//!
//! Collects every value a producer emits and completes a
//! [`CompletionSlot`] with the whole sequence once the producer completes.
//! Nothing is visible before completion: a producer that fails delivers only
//! its error, and a producer that never completes leaves the slot pending
//! until its owner times it out.
//!
//! The buffer is unbounded. Long running or unbounded producers grow memory
//! and response latency without limit; use
//! [`StreamingSink`](super::StreamingSink) for them instead.

use crate::deferred::CompletionSlot;
use crate::error::{ComponentInfo, WriteError};
use crate::sink::ResponseSink;
use std::fmt;
use tracing::{debug, trace};

/// Sink that buffers values into `B` and resolves slot `S` with it.
///
/// `B` is the target ordered-sequence type, `Vec<T>` unless chosen
/// otherwise; any `Default + Extend<T>` collection that keeps insertion
/// order works.
pub struct AggregatingSink<S, B> {
  slot: S,
  buffer: B,
  buffered: usize,
  name: Option<String>,
}

impl<S, B: Default> AggregatingSink<S, B> {
  /// Creates a sink that completes `slot`.
  pub fn new(slot: S) -> Self {
    Self {
      slot,
      buffer: B::default(),
      buffered: 0,
      name: None,
    }
  }

  /// Sets the name used in log records.
  #[must_use]
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Appends a value to the buffer.
  pub fn append<T>(&mut self, value: T)
  where
    B: Extend<T>,
  {
    self.buffer.extend(std::iter::once(value));
    self.buffered += 1;
    trace!(buffered = self.buffered, "value buffered");
  }

  /// Completes the slot with everything buffered so far, in emission order.
  ///
  /// Returns `false` if the slot had already been completed elsewhere, for
  /// example by its timeout.
  pub fn resolve<E>(&mut self) -> bool
  where
    S: CompletionSlot<B, E>,
  {
    let values = std::mem::take(&mut self.buffer);
    debug!(values = self.buffered, "resolving deferred result");
    let resolved = self.slot.resolve(values);
    if !resolved {
      debug!("deferred result already completed, buffered values discarded");
    }
    resolved
  }

  /// Fails the slot with `error`, discarding the buffer.
  pub fn fail<E>(&mut self, error: E) -> bool
  where
    S: CompletionSlot<B, E>,
  {
    self.buffer = B::default();
    debug!(discarded = self.buffered, "failing deferred result");
    let failed = self.slot.fail(error);
    if !failed {
      debug!("deferred result already completed, error discarded");
    }
    failed
  }

  /// Returns the number of values buffered so far.
  pub fn buffered(&self) -> usize {
    self.buffered
  }

  /// Returns the slot this sink completes.
  pub fn slot(&self) -> &S {
    &self.slot
  }
}

impl<T, E, S, B> ResponseSink<T, E> for AggregatingSink<S, B>
where
  S: CompletionSlot<B, E>,
  B: Default + Extend<T> + Send,
{
  fn on_value(&mut self, value: T) -> Result<(), WriteError> {
    self.append(value);
    Ok(())
  }

  fn on_complete(&mut self) {
    self.resolve::<E>();
  }

  fn on_error(&mut self, error: E) {
    self.fail(error);
  }

  fn component_info(&self) -> ComponentInfo {
    ComponentInfo::of::<Self>(self.name.as_deref())
  }
}

impl<S: fmt::Debug, B> fmt::Debug for AggregatingSink<S, B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AggregatingSink")
      .field("slot", &self.slot)
      .field("buffered", &self.buffered)
      .field("name", &self.name)
      .finish()
  }
}
