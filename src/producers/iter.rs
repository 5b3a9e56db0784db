//! Synchronous producer that replays an iterator of results.
//!
//! Every callback runs on the thread that calls `subscribe`, and delivery
//! is finished by the time `subscribe` returns. The observer receives its
//! handle through `on_subscribe` first, so it can still stop the iteration
//! part-way.

use crate::observer::Observer;
use crate::producer::Producer;
use crate::subscription::SubscriptionHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Producer over an iterator of `Result<T, E>`.
///
/// `Ok` items are delivered as values; the first `Err` terminates the
/// sequence with that error; exhausting the iterator completes it.
#[derive(Debug, Clone)]
pub struct IterProducer<I> {
  items: I,
}

impl<I> IterProducer<I> {
  /// Creates a producer over `items`.
  pub fn new(items: I) -> Self {
    Self { items }
  }
}

impl<T, E> IterProducer<Vec<Result<T, E>>> {
  /// Creates a producer that emits `values` and then completes.
  pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
    Self::new(values.into_iter().map(Ok).collect())
  }

  /// Creates a producer that emits `values` and then fails with `error`.
  pub fn failing_after(values: impl IntoIterator<Item = T>, error: E) -> Self {
    let mut items: Vec<Result<T, E>> = values.into_iter().map(Ok).collect();
    items.push(Err(error));
    Self::new(items)
  }
}

impl<I, T, E> Producer<T, E> for IterProducer<I>
where
  I: IntoIterator<Item = Result<T, E>>,
{
  fn subscribe(self, observer: Arc<dyn Observer<T, E>>) -> SubscriptionHandle {
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);
    let handle = SubscriptionHandle::new(move || flag.store(true, Ordering::Release));
    observer.on_subscribe(handle.clone());

    for item in self.items {
      if stopped.load(Ordering::Acquire) {
        trace!("iter producer unsubscribed, dropping remaining items");
        return handle;
      }
      match item {
        Ok(value) => observer.on_next(value),
        Err(error) => {
          observer.on_error(error);
          return handle;
        }
      }
    }
    if !stopped.load(Ordering::Acquire) {
      observer.on_complete();
    }
    handle
  }
}
