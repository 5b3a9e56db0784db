//! # Deferred Result
//!
//! The single-shot completion slot that an aggregating response resolves.
//!
//! A [`DeferredResult`] holds at most one terminal outcome. Exactly one of
//! `resolve`, `fail`, or expiry takes effect; every later attempt returns
//! `false` and leaves the slot untouched. The request layer owns the slot:
//! it awaits the outcome with [`DeferredResult::await_outcome`], which also
//! enforces the configured timeout, and registers timeout callbacks so that
//! upstream work can be cancelled when the client stops waiting.
//!
//! ## Timeout results
//!
//! When a timeout result is configured, expiry resolves the slot with that
//! value; otherwise the outcome is [`DeferredOutcome::TimedOut`].

use crate::config::DeferredConfig;
use crate::error::BridgeError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

type Callback = Box<dyn FnOnce() + Send>;

/// Single-shot completion primitive consumed by the aggregating sink.
pub trait CompletionSlot<T, E>: Send + Sync {
  /// Completes the slot with a value. Returns `false` if it was already
  /// completed.
  fn resolve(&self, value: T) -> bool;

  /// Completes the slot with an error. Returns `false` if it was already
  /// completed.
  fn fail(&self, error: E) -> bool;

  /// Registers a callback to run when the slot's owner gives up waiting.
  fn on_timeout(&self, callback: Box<dyn FnOnce() + Send>);
}

/// Terminal outcome of a [`DeferredResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredOutcome<T, E> {
  /// Resolved with a value, either by the producer side or as the
  /// configured timeout result.
  Resolved(T),
  /// Failed with the producer's error.
  Failed(E),
  /// Expired without a configured timeout result.
  TimedOut,
}

enum SlotState<T, E> {
  Pending,
  Done(DeferredOutcome<T, E>),
  Taken,
}

struct Inner<T, E> {
  state: SlotState<T, E>,
  expired: bool,
  timeout_result: Option<T>,
  timeout_callbacks: Vec<Callback>,
}

struct Shared<T, E> {
  inner: Mutex<Inner<T, E>>,
  notify: Notify,
  timeout: Option<Duration>,
}

/// Deferred single-shot result.
///
/// Cloning yields another reference to the same slot.
pub struct DeferredResult<T, E> {
  shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for DeferredResult<T, E> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T, E> DeferredResult<T, E> {
  /// Creates a pending slot that expires after `timeout`, or never.
  pub fn new(timeout: Option<Duration>) -> Self {
    Self {
      shared: Arc::new(Shared {
        inner: Mutex::new(Inner {
          state: SlotState::Pending,
          expired: false,
          timeout_result: None,
          timeout_callbacks: Vec::new(),
        }),
        notify: Notify::new(),
        timeout,
      }),
    }
  }

  /// Creates a pending slot from configuration.
  pub fn from_config(config: &DeferredConfig) -> Self {
    Self::new(config.timeout())
  }

  /// Sets the value the slot resolves with when it expires.
  #[must_use]
  pub fn with_timeout_result(self, value: T) -> Self {
    self.lock().timeout_result = Some(value);
    self
  }

  /// Returns the configured expiry timeout.
  pub fn timeout(&self) -> Option<Duration> {
    self.shared.timeout
  }

  /// Completes the slot with a value.
  pub fn resolve(&self, value: T) -> bool {
    self.complete(DeferredOutcome::Resolved(value))
  }

  /// Completes the slot with an error.
  pub fn fail(&self, error: E) -> bool {
    self.complete(DeferredOutcome::Failed(error))
  }

  /// Expires the slot and runs the timeout callbacks.
  ///
  /// Returns `false` if the slot was already completed, in which case no
  /// callback runs.
  pub fn expire(&self) -> bool {
    let callbacks = {
      let mut inner = self.lock();
      if !matches!(inner.state, SlotState::Pending) {
        return false;
      }
      let outcome = match inner.timeout_result.take() {
        Some(value) => DeferredOutcome::Resolved(value),
        None => DeferredOutcome::TimedOut,
      };
      inner.state = SlotState::Done(outcome);
      inner.expired = true;
      std::mem::take(&mut inner.timeout_callbacks)
    };
    debug!(callbacks = callbacks.len(), "deferred result expired");
    for callback in callbacks {
      callback();
    }
    self.shared.notify.notify_waiters();
    true
  }

  /// Registers a callback for expiry. If the slot has already expired the
  /// callback runs immediately.
  pub fn on_timeout<F>(&self, callback: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let mut inner = self.lock();
    if inner.expired {
      drop(inner);
      callback();
    } else {
      inner.timeout_callbacks.push(Box::new(callback));
    }
  }

  /// Returns whether an outcome has been recorded, by completion or expiry.
  pub fn is_set_or_expired(&self) -> bool {
    !matches!(self.lock().state, SlotState::Pending)
  }

  /// Returns whether the slot expired.
  pub fn is_expired(&self) -> bool {
    self.lock().expired
  }

  /// Takes the outcome if one has been recorded.
  ///
  /// Returns `None` while pending and `Err(OutcomeTaken)` once the outcome
  /// has been taken.
  pub fn try_outcome(&self) -> Option<Result<DeferredOutcome<T, E>, BridgeError>> {
    let mut inner = self.lock();
    match std::mem::replace(&mut inner.state, SlotState::Taken) {
      SlotState::Pending => {
        inner.state = SlotState::Pending;
        None
      }
      SlotState::Done(outcome) => Some(Ok(outcome)),
      SlotState::Taken => Some(Err(BridgeError::OutcomeTaken)),
    }
  }

  /// Waits for the outcome and takes it.
  ///
  /// The configured timeout is measured from this call. When it elapses the
  /// slot is expired, which runs the timeout callbacks.
  pub async fn await_outcome(&self) -> Result<DeferredOutcome<T, E>, BridgeError> {
    let Some(timeout) = self.shared.timeout else {
      return self.wait().await;
    };
    match tokio::time::timeout(timeout, self.wait()).await {
      Ok(outcome) => outcome,
      Err(_) => {
        self.expire();
        self.wait().await
      }
    }
  }

  async fn wait(&self) -> Result<DeferredOutcome<T, E>, BridgeError> {
    loop {
      let notified = self.shared.notify.notified();
      if let Some(outcome) = self.try_outcome() {
        return outcome;
      }
      notified.await;
    }
  }

  fn complete(&self, outcome: DeferredOutcome<T, E>) -> bool {
    {
      let mut inner = self.lock();
      if !matches!(inner.state, SlotState::Pending) {
        debug!("deferred result already completed, discarding outcome");
        return false;
      }
      inner.state = SlotState::Done(outcome);
    }
    self.shared.notify.notify_waiters();
    true
  }

  fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
    self
      .shared
      .inner
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

impl<T, E> CompletionSlot<T, E> for DeferredResult<T, E>
where
  T: Send,
  E: Send,
{
  fn resolve(&self, value: T) -> bool {
    DeferredResult::resolve(self, value)
  }

  fn fail(&self, error: E) -> bool {
    DeferredResult::fail(self, error)
  }

  fn on_timeout(&self, callback: Box<dyn FnOnce() + Send>) {
    DeferredResult::on_timeout(self, callback)
  }
}

impl<T, E> fmt::Debug for DeferredResult<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.lock();
    let state = match inner.state {
      SlotState::Pending => "pending",
      SlotState::Done(_) => "done",
      SlotState::Taken => "taken",
    };
    f.debug_struct("DeferredResult")
      .field("state", &state)
      .field("expired", &inner.expired)
      .field("timeout", &self.shared.timeout)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::StringError;
  use std::sync::atomic::{AtomicUsize, Ordering};

  type Slot = DeferredResult<Vec<i32>, StringError>;

  #[test]
  fn test_resolve_once() {
    let slot = Slot::new(None);
    assert!(!slot.is_set_or_expired());
    assert!(slot.resolve(vec![1, 2]));
    assert!(!slot.resolve(vec![3]));
    assert!(!slot.fail(StringError::new("late")));
    assert!(slot.is_set_or_expired());

    match slot.try_outcome() {
      Some(Ok(DeferredOutcome::Resolved(values))) => assert_eq!(values, vec![1, 2]),
      other => panic!("Expected resolved outcome, got {:?}", other),
    }
  }

  #[test]
  fn test_fail_once() {
    let slot = Slot::new(None);
    assert!(slot.fail(StringError::new("boom")));
    assert!(!slot.resolve(vec![1]));

    match slot.try_outcome() {
      Some(Ok(DeferredOutcome::Failed(error))) => assert_eq!(error.0, "boom"),
      other => panic!("Expected failed outcome, got {:?}", other),
    }
  }

  #[test]
  fn test_try_outcome_pending_and_taken() {
    let slot = Slot::new(None);
    assert!(slot.try_outcome().is_none());

    slot.resolve(vec![]);
    assert!(matches!(slot.try_outcome(), Some(Ok(_))));
    assert!(matches!(
      slot.try_outcome(),
      Some(Err(BridgeError::OutcomeTaken))
    ));
    assert!(!slot.resolve(vec![9]));
  }

  #[test]
  fn test_expire_without_timeout_result() {
    let slot = Slot::new(None);
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    slot.on_timeout(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(slot.expire());
    assert!(!slot.expire());
    assert!(slot.is_expired());
    assert!(!slot.resolve(vec![1]));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(matches!(
      slot.try_outcome(),
      Some(Ok(DeferredOutcome::TimedOut))
    ));
  }

  #[test]
  fn test_expire_with_timeout_result() {
    let slot = Slot::new(None).with_timeout_result(Vec::new());
    assert!(slot.expire());

    match slot.try_outcome() {
      Some(Ok(DeferredOutcome::Resolved(values))) => assert!(values.is_empty()),
      other => panic!("Expected timeout result, got {:?}", other),
    }
  }

  #[test]
  fn test_expire_after_resolve_skips_callbacks() {
    let slot = Slot::new(None);
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    slot.on_timeout(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    slot.resolve(vec![1]);
    assert!(!slot.expire());
    assert!(!slot.is_expired());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_on_timeout_after_expiry_runs_immediately() {
    let slot = Slot::new(None);
    slot.expire();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    slot.on_timeout(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_await_outcome_resolved_from_another_task() {
    let slot = Slot::new(None);
    let writer = slot.clone();
    tokio::spawn(async move {
      tokio::task::yield_now().await;
      writer.resolve(vec![4, 5]);
    });

    match slot.await_outcome().await {
      Ok(DeferredOutcome::Resolved(values)) => assert_eq!(values, vec![4, 5]),
      other => panic!("Expected resolved outcome, got {:?}", other),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_await_outcome_times_out() {
    let slot = Slot::from_config(&DeferredConfig::default().with_timeout(Duration::from_secs(5)));
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    slot.on_timeout(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    let outcome = slot.await_outcome().await.unwrap();
    assert_eq!(outcome, DeferredOutcome::TimedOut);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_await_outcome_uses_timeout_result() {
    let slot = Slot::new(Some(Duration::from_millis(250))).with_timeout_result(vec![-1]);

    let outcome = slot.await_outcome().await.unwrap();
    assert_eq!(outcome, DeferredOutcome::Resolved(vec![-1]));
  }
}
