//! # Observable Responses
//!
//! Request-facing wrappers that attach a producer to a response in one step
//! and wire the response's own lifecycle back to the subscription:
//!
//! - [`ObservableDeferredResult`] aggregates the whole sequence into a
//!   [`DeferredResult`]. When the deferred result times out, the subscription
//!   is cancelled and the slot resolves with the timeout result instead.
//! - [`ObservableSseEmitter`] forwards each value as a server-sent event.
//!   When the client disconnects or the emitter times out, the subscription
//!   is cancelled.
//! - [`ObservableResponse`] picks one of the two from a [`DeliveryMode`].
//!
//! The wrappers hold the subscriber; the timeout and disconnect hooks only
//! hold a weak reference, so dropping a wrapper does not leak the
//! subscriber through its own response.
//!
//! ## Example
//!
//! ```rust
//! use streambridge::config::DeferredConfig;
//! use streambridge::deferred::DeferredOutcome;
//! use streambridge::producers::IterProducer;
//! use streambridge::response::ObservableDeferredResult;
//! use streambridge::StringError;
//!
//! # tokio_test::block_on(async {
//! let producer = IterProducer::<Vec<Result<&str, StringError>>>::from_values(vec!["a", "b"]);
//! let response = ObservableDeferredResult::new(producer, &DeferredConfig::default());
//!
//! let outcome = response.await_outcome().await.unwrap();
//! assert_eq!(outcome, DeferredOutcome::Resolved(vec!["a", "b"]));
//! # });
//! ```

use crate::config::{BridgeConfig, DeferredConfig, DeliveryMode, EmitterConfig};
use crate::deferred::{DeferredOutcome, DeferredResult};
use crate::emitter::{Frame, SseEmitter};
use crate::error::BridgeError;
use crate::producer::Producer;
use crate::sink::ResponseSink;
use crate::sinks::{AggregatingSink, StreamingSink};
use crate::subscriber::StreamSubscriber;
use serde::Serialize;
use std::fmt::{self, Display};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::Receiver;
use tracing::debug;

type Aggregator<T, E> = AggregatingSink<DeferredResult<Vec<T>, E>, Vec<T>>;

/// A deferred result completed with every value a producer emits.
///
/// Aggregation buffers the whole sequence in memory and answers only once
/// the producer completes. For long running or unbounded producers use
/// [`ObservableSseEmitter`].
pub struct ObservableDeferredResult<T, E> {
  deferred: DeferredResult<Vec<T>, E>,
  subscriber: Arc<StreamSubscriber<T, E, Aggregator<T, E>>>,
}

impl<T, E> ObservableDeferredResult<T, E>
where
  T: Send + 'static,
  E: Send + 'static,
{
  /// Subscribes to `producer`, resolving with `TimedOut` on timeout.
  pub fn new<P>(producer: P, config: &DeferredConfig) -> Self
  where
    P: Producer<T, E>,
  {
    Self::attach(producer, DeferredResult::from_config(config))
  }

  /// Subscribes to `producer`, resolving with `timeout_result` on timeout.
  pub fn with_timeout_result<P>(producer: P, config: &DeferredConfig, timeout_result: Vec<T>) -> Self
  where
    P: Producer<T, E>,
  {
    Self::attach(
      producer,
      DeferredResult::from_config(config).with_timeout_result(timeout_result),
    )
  }

  fn attach<P>(producer: P, deferred: DeferredResult<Vec<T>, E>) -> Self
  where
    P: Producer<T, E>,
  {
    let sink: Aggregator<T, E> = AggregatingSink::new(deferred.clone());
    let subscriber = StreamSubscriber::new(sink);
    deferred.on_timeout(cancel_hook(&subscriber, "deferred result timed out"));
    subscriber.subscribe_to(producer);
    Self {
      deferred,
      subscriber,
    }
  }

  /// Returns the deferred result the sequence is delivered into.
  pub fn deferred_result(&self) -> &DeferredResult<Vec<T>, E> {
    &self.deferred
  }

  /// Waits for the outcome, honouring the configured timeout.
  pub async fn await_outcome(&self) -> Result<DeferredOutcome<Vec<T>, E>, BridgeError> {
    self.deferred.await_outcome().await
  }

  /// Cancels the subscription. The deferred result is left untouched.
  pub fn cancel(&self) -> bool {
    self.subscriber.cancel()
  }

  /// Returns whether the subscription has terminated.
  pub fn is_terminated(&self) -> bool {
    self.subscriber.is_terminated()
  }
}

impl<T, E> fmt::Debug for ObservableDeferredResult<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ObservableDeferredResult")
      .field("deferred", &self.deferred)
      .field("subscriber", &self.subscriber)
      .finish()
  }
}

/// A server-sent event emitter fed one event per value.
pub struct ObservableSseEmitter<T, E> {
  emitter: SseEmitter,
  subscriber: Arc<StreamSubscriber<T, E, StreamingSink<SseEmitter>>>,
}

impl<T, E> ObservableSseEmitter<T, E>
where
  T: Serialize + Send + 'static,
  E: Display + Send + 'static,
{
  /// Subscribes to `producer` and returns the emitter with its frame
  /// receiver, which the response body drains.
  pub fn new<P>(producer: P, config: &EmitterConfig) -> (Self, Receiver<Frame>)
  where
    P: Producer<T, E>,
  {
    let (emitter, frames) = SseEmitter::new(config);
    let sink = StreamingSink::from_config(emitter.clone(), config);
    let subscriber = StreamSubscriber::new(sink);
    emitter.on_disconnect(cancel_hook(&subscriber, "sse client disconnected"));
    emitter.on_timeout(cancel_hook(&subscriber, "sse emitter timed out"));
    subscriber.subscribe_to(producer);
    (
      Self {
        emitter,
        subscriber,
      },
      frames,
    )
  }

  /// Returns the emitter events are written to.
  pub fn emitter(&self) -> &SseEmitter {
    &self.emitter
  }

  /// Cancels the subscription and closes the emitter without a completion
  /// frame.
  ///
  /// If the stream already terminated, its own terminal frame closes the
  /// emitter and this does nothing.
  pub fn cancel(&self) -> bool {
    let cancelled = self.subscriber.cancel();
    if cancelled {
      self.emitter.complete();
    }
    cancelled
  }

  /// Returns whether the subscription has terminated.
  pub fn is_terminated(&self) -> bool {
    self.subscriber.is_terminated()
  }
}

impl<T, E> fmt::Debug for ObservableSseEmitter<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ObservableSseEmitter")
      .field("emitter", &self.emitter)
      .field("subscriber", &self.subscriber)
      .finish()
  }
}

/// A producer attached to a response in either delivery mode.
#[derive(Debug)]
pub enum ObservableResponse<T, E> {
  /// Aggregating delivery.
  Deferred(ObservableDeferredResult<T, E>),
  /// Streaming delivery, with the receiver the response body drains.
  Events(ObservableSseEmitter<T, E>, Receiver<Frame>),
}

impl<T, E> ObservableResponse<T, E>
where
  T: Serialize + Send + 'static,
  E: Display + Send + 'static,
{
  /// Attaches `producer` in `mode`, using the matching section of `config`.
  pub fn attach<P>(producer: P, mode: DeliveryMode, config: &BridgeConfig) -> Result<Self, BridgeError>
  where
    P: Producer<T, E>,
  {
    config.validate()?;
    debug!(?mode, "attaching producer to response");
    Ok(match mode {
      DeliveryMode::Aggregating => {
        Self::Deferred(ObservableDeferredResult::new(producer, &config.deferred))
      }
      DeliveryMode::Streaming => {
        let (emitter, frames) = ObservableSseEmitter::new(producer, &config.emitter);
        Self::Events(emitter, frames)
      }
    })
  }

  /// Attaches `producer` in the mode named by `config`.
  pub fn from_config<P>(producer: P, config: &BridgeConfig) -> Result<Self, BridgeError>
  where
    P: Producer<T, E>,
  {
    Self::attach(producer, config.mode, config)
  }

  /// Returns the delivery mode of this response.
  pub fn mode(&self) -> DeliveryMode {
    match self {
      Self::Deferred(_) => DeliveryMode::Aggregating,
      Self::Events(..) => DeliveryMode::Streaming,
    }
  }

  /// Cancels the subscription.
  pub fn cancel(&self) -> bool {
    match self {
      Self::Deferred(deferred) => deferred.cancel(),
      Self::Events(emitter, _) => emitter.cancel(),
    }
  }
}

fn cancel_hook<T, E, K>(
  subscriber: &Arc<StreamSubscriber<T, E, K>>,
  reason: &'static str,
) -> impl FnOnce() + Send + 'static
where
  K: ResponseSink<T, E> + 'static,
  T: 'static,
  E: Send + 'static,
{
  let weak: Weak<StreamSubscriber<T, E, K>> = Arc::downgrade(subscriber);
  move || {
    let Some(subscriber) = weak.upgrade() else {
      return;
    };
    if subscriber.cancel() {
      debug!(reason, "subscription cancelled");
    }
  }
}
