//! # Stream Subscriber
//!
//! [`StreamSubscriber`] sits between a producer and a response sink. It is
//! the producer's [`Observer`], drives the sink, and owns the subscription
//! handle so the request layer can cancel upstream work.
//!
//! ## Guarantees
//!
//! Producer callbacks and `cancel` may run concurrently on different
//! threads. Whatever the interleaving:
//!
//! - at most one terminal action takes effect: completing the sink,
//!   failing it, or silently cancelling;
//! - no value reaches the sink once a terminal action has been claimed;
//! - once `cancel` returns, the sink sees nothing more, even if the producer
//!   ignores the unsubscribe and keeps calling back.
//!
//! Terminal paths race on a [`TerminalGate`]. Value delivery holds the sink
//! lock and re-checks the gate under it, so a winning terminal path that
//! takes the sink waits for an in-flight value to finish and every later
//! value is dropped. A terminal signal raised on the delivering thread from
//! inside the sink's `on_value` cannot wait for that lock; it is recorded
//! and applied by the delivery once `on_value` returns.
//!
//! ## Example
//!
//! ```rust
//! use streambridge::deferred::{DeferredOutcome, DeferredResult};
//! use streambridge::producers::IterProducer;
//! use streambridge::sinks::AggregatingSink;
//! use streambridge::{StreamSubscriber, StringError};
//!
//! let slot = DeferredResult::<Vec<i32>, StringError>::new(None);
//! let sink: AggregatingSink<_, Vec<i32>> = AggregatingSink::new(slot.clone());
//! let subscriber = StreamSubscriber::attach(IterProducer::from_values(vec![1, 2, 3]), sink);
//!
//! assert!(subscriber.is_terminated());
//! assert!(matches!(
//!   slot.try_outcome(),
//!   Some(Ok(DeferredOutcome::Resolved(values))) if values == vec![1, 2, 3]
//! ));
//! ```

use crate::error::{ComponentInfo, WriteError};
use crate::gate::{GateState, TerminalGate};
use crate::observer::Observer;
use crate::producer::Producer;
use crate::sink::ResponseSink;
use crate::subscription::SubscriptionHandle;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};

/// Terminal signal claimed on the gate.
enum Signal<E> {
  Complete,
  Error(E),
  Cancel,
}

impl<E> Signal<E> {
  fn name(&self) -> &'static str {
    match self {
      Self::Complete => "complete",
      Self::Error(_) => "error",
      Self::Cancel => "cancel",
    }
  }
}

/// Observer that delivers a producer's sequence into a response sink.
pub struct StreamSubscriber<T, E, K> {
  gate: TerminalGate,
  sink: Mutex<Option<K>>,
  handle: Mutex<Option<SubscriptionHandle>>,
  // Thread inside `on_value`, set only while it holds `sink`.
  delivering: Mutex<Option<ThreadId>>,
  // Terminal signal raised by that thread from inside `on_value`.
  raised: Mutex<Option<Signal<E>>>,
  info: ComponentInfo,
  _marker: PhantomData<fn(T)>,
}

impl<T, E, K> StreamSubscriber<T, E, K>
where
  K: ResponseSink<T, E>,
  T: 'static,
  E: Send + 'static,
  K: 'static,
{
  /// Creates a subscriber for `sink` that is not yet attached to a producer.
  pub fn new(sink: K) -> Arc<Self> {
    let info = sink.component_info();
    Arc::new(Self {
      gate: TerminalGate::new(),
      sink: Mutex::new(Some(sink)),
      handle: Mutex::new(None),
      delivering: Mutex::new(None),
      raised: Mutex::new(None),
      info,
      _marker: PhantomData,
    })
  }

  /// Creates a subscriber for `sink` and attaches it to `producer`.
  pub fn attach<P>(producer: P, sink: K) -> Arc<Self>
  where
    P: Producer<T, E>,
  {
    let subscriber = Self::new(sink);
    subscriber.subscribe_to(producer);
    subscriber
  }

  /// Attaches this subscriber to `producer` and returns the subscription.
  ///
  /// If a terminal action took effect while `subscribe` was running, for
  /// instance a synchronous producer that completed, or a concurrent
  /// `cancel`, the subscription is released before this returns.
  pub fn subscribe_to<P>(self: &Arc<Self>, producer: P) -> SubscriptionHandle
  where
    P: Producer<T, E>,
  {
    debug!(component = %self.info, "attaching subscriber");
    let observer: Arc<dyn Observer<T, E>> = self.clone();
    let handle = producer.subscribe(observer);
    self.store_handle(handle.clone());
    handle
  }
}

impl<T, E, K> StreamSubscriber<T, E, K>
where
  K: ResponseSink<T, E>,
  E: Send,
{
  /// Cancels the subscription without any sink callback.
  ///
  /// Returns `true` if the cancellation took effect, `false` if the
  /// subscription had already terminated. The deferred result or event
  /// channel is left for its owner to resolve.
  ///
  /// May be called from inside the sink's own `on_value`, for instance by a
  /// channel that runs its disconnect callbacks from `write`; the
  /// cancellation then completes once `on_value` returns.
  pub fn cancel(&self) -> bool {
    self.terminate(Signal::Cancel)
  }

  /// Returns whether a terminal action has been claimed.
  pub fn is_terminated(&self) -> bool {
    !self.gate.is_pending()
  }

  /// Returns the state of the terminal gate.
  pub fn state(&self) -> GateState {
    self.gate.state()
  }

  /// Returns the subscription, once the producer has handed it over.
  pub fn handle(&self) -> Option<SubscriptionHandle> {
    lock(&self.handle).clone()
  }

  /// Returns information about the sink this subscriber drives.
  pub fn component_info(&self) -> &ComponentInfo {
    &self.info
  }

  fn store_handle(&self, handle: SubscriptionHandle) {
    lock(&self.handle).get_or_insert_with(|| handle.clone());
    // A terminal path may have run before the handle was known.
    if !self.gate.is_pending() {
      handle.unsubscribe();
    }
  }

  fn unsubscribe(&self) {
    let handle = lock(&self.handle).clone();
    if let Some(handle) = handle {
      if handle.unsubscribe() {
        trace!(component = %self.info, "unsubscribed from producer");
      }
    }
  }

  fn delivering_here(&self) -> bool {
    *lock(&self.delivering) == Some(thread::current().id())
  }

  fn deliver(&self, value: T) {
    if !self.gate.is_pending() {
      trace!(component = %self.info, "dropping value after terminal signal");
      return;
    }
    let mut sink = lock(&self.sink);
    if !self.gate.is_pending() {
      trace!(component = %self.info, "dropping value after terminal signal");
      return;
    }
    let Some(active) = sink.as_mut() else {
      return;
    };
    let result = {
      *lock(&self.delivering) = Some(thread::current().id());
      let _reset = scopeguard::guard((), |_| *lock(&self.delivering) = None);
      active.on_value(value)
    };

    let raised = lock(&self.raised).take();
    if let Some(signal) = raised {
      let taken = sink.take();
      drop(sink);
      self.apply(taken, signal);
      return;
    }
    let Err(error) = result else {
      return;
    };

    warn!(component = %self.info, %error, "delivery failed, cancelling subscription");
    if !self.gate.try_claim() {
      return;
    }
    let aborted = sink.take();
    drop(sink);
    self.finish_abort(aborted, &error);
  }

  fn finish_abort(&self, sink: Option<K>, error: &WriteError) {
    let _finished = scopeguard::guard((), |_| self.gate.finish());
    if let Some(mut sink) = sink {
      sink.abort(error);
    }
    self.unsubscribe();
  }

  fn terminate(&self, signal: Signal<E>) -> bool {
    if !self.gate.try_claim() {
      debug!(component = %self.info, signal = signal.name(), "already terminated, discarding signal");
      return false;
    }
    if self.delivering_here() {
      // This thread holds the sink inside `on_value`; the delivery applies
      // the signal once it returns.
      debug!(component = %self.info, signal = signal.name(), "terminal signal raised during delivery");
      *lock(&self.raised) = Some(signal);
      return true;
    }
    // Taking the sink waits for an in-flight value to finish.
    let sink = lock(&self.sink).take();
    self.apply(sink, signal);
    true
  }

  fn apply(&self, sink: Option<K>, signal: Signal<E>) {
    let _finished = scopeguard::guard((), |_| self.gate.finish());
    debug!(component = %self.info, signal = signal.name(), "terminal signal");
    if let Some(mut sink) = sink {
      match signal {
        Signal::Complete => sink.on_complete(),
        Signal::Error(error) => sink.on_error(error),
        Signal::Cancel => {}
      }
    }
    self.unsubscribe();
  }
}

impl<T, E, K> Observer<T, E> for StreamSubscriber<T, E, K>
where
  K: ResponseSink<T, E>,
  E: Send,
{
  fn on_subscribe(&self, handle: SubscriptionHandle) {
    self.store_handle(handle);
  }

  fn on_next(&self, value: T) {
    self.deliver(value);
  }

  fn on_error(&self, error: E) {
    self.terminate(Signal::Error(error));
  }

  fn on_complete(&self) {
    self.terminate(Signal::Complete);
  }
}

impl<T, E, K> fmt::Debug for StreamSubscriber<T, E, K> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StreamSubscriber")
      .field("component", &self.info)
      .field("state", &self.gate.state())
      .field("handle", &*lock(&self.handle))
      .finish()
  }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
