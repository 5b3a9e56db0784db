//! # Subscription Handle
//!
//! A [`SubscriptionHandle`] is what a producer hands back from `subscribe`.
//! It owns the teardown that stops upstream work and runs it at most once,
//! no matter how many times, or from how many threads, `unsubscribe` is
//! called.
//!
//! Unsubscribing is best-effort: a producer may still deliver callbacks that
//! were already in flight. Consumers that need a hard guarantee enforce it
//! themselves (see [`TerminalGate`](crate::gate::TerminalGate)).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

type Teardown = Box<dyn FnOnce() + Send>;

struct HandleInner {
  unsubscribed: AtomicBool,
  teardown: Mutex<Option<Teardown>>,
}

/// Cancellation token for one producer/observer attachment.
///
/// Cloning yields another reference to the same attachment.
#[derive(Clone)]
pub struct SubscriptionHandle {
  inner: Arc<HandleInner>,
}

impl SubscriptionHandle {
  /// Creates a handle that runs `teardown` on the first `unsubscribe`.
  pub fn new<F>(teardown: F) -> Self
  where
    F: FnOnce() + Send + 'static,
  {
    Self::with_teardown(Some(Box::new(teardown)))
  }

  /// Creates a handle with nothing to tear down, for producers that finish
  /// before `subscribe` returns.
  pub fn empty() -> Self {
    Self::with_teardown(None)
  }

  /// Creates a handle that cancels `token` on unsubscribe.
  pub fn from_token(token: CancellationToken) -> Self {
    Self::new(move || token.cancel())
  }

  fn with_teardown(teardown: Option<Teardown>) -> Self {
    Self {
      inner: Arc::new(HandleInner {
        unsubscribed: AtomicBool::new(false),
        teardown: Mutex::new(teardown),
      }),
    }
  }

  /// Stops the attachment.
  ///
  /// Returns `true` only for the call that actually performed the teardown.
  pub fn unsubscribe(&self) -> bool {
    if self.inner.unsubscribed.swap(true, Ordering::AcqRel) {
      return false;
    }
    let teardown = self
      .inner
      .teardown
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if let Some(teardown) = teardown {
      teardown();
    }
    true
  }

  /// Returns whether `unsubscribe` has been called.
  pub fn is_unsubscribed(&self) -> bool {
    self.inner.unsubscribed.load(Ordering::Acquire)
  }
}

impl fmt::Debug for SubscriptionHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SubscriptionHandle")
      .field("unsubscribed", &self.is_unsubscribed())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::thread;

  #[test]
  fn test_unsubscribe_runs_teardown_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handle = SubscriptionHandle::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!handle.is_unsubscribed());
    assert!(handle.unsubscribe());
    assert!(!handle.unsubscribe());
    assert!(handle.is_unsubscribed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_clones_share_state() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handle = SubscriptionHandle::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    let other = handle.clone();

    assert!(other.unsubscribe());
    assert!(handle.is_unsubscribed());
    assert!(!handle.unsubscribe());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_empty_handle() {
    let handle = SubscriptionHandle::empty();
    assert!(handle.unsubscribe());
    assert!(!handle.unsubscribe());
  }

  #[test]
  fn test_from_token_cancels() {
    let token = CancellationToken::new();
    let handle = SubscriptionHandle::from_token(token.clone());

    handle.unsubscribe();
    assert!(token.is_cancelled());
  }

  #[test]
  fn test_concurrent_unsubscribe() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handle = SubscriptionHandle::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    let winners: usize = (0..8)
      .map(|_| {
        let handle = handle.clone();
        thread::spawn(move || handle.unsubscribe())
      })
      .collect::<Vec<_>>()
      .into_iter()
      .map(|join| usize::from(join.join().unwrap()))
      .sum();

    assert_eq!(winners, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
