//! The callback set a producer drives.

use crate::subscription::SubscriptionHandle;

/// Receiver of a producer's notifications.
///
/// A well-behaved producer calls `on_next` zero or more times in emission
/// order, followed by at most one of `on_error` or `on_complete`. Nothing
/// is delivered after a terminal call.
///
/// Callbacks may arrive on any thread: a worker task owned by the producer,
/// an I/O completion thread, or synchronously on the thread that called
/// `subscribe`. Implementations must therefore be `Send + Sync` and take
/// `&self`.
pub trait Observer<T, E>: Send + Sync {
  /// Hands the observer its subscription before any value is delivered.
  ///
  /// Producers that deliver synchronously inside `subscribe` call this so
  /// the observer can unsubscribe mid-delivery; the same handle is also
  /// returned from `subscribe`.
  fn on_subscribe(&self, _handle: SubscriptionHandle) {}

  /// Delivers the next value.
  fn on_next(&self, value: T);

  /// Terminates the sequence with an error.
  fn on_error(&self, error: E);

  /// Terminates the sequence normally.
  fn on_complete(&self);
}
