//! # Producer Trait
//!
//! A producer is a push-based source: once subscribed, it calls the
//! observer's callbacks on whatever execution context it likes, until it
//! completes, fails, or is unsubscribed.
//!
//! ## Implementations
//!
//! - [`IterProducer`](crate::producers::IterProducer): delivers an iterator
//!   synchronously on the subscribing thread
//! - [`StreamProducer`](crate::producers::StreamProducer): drives a
//!   `futures::Stream` on a tokio task

use crate::observer::Observer;
use crate::subscription::SubscriptionHandle;
use std::sync::Arc;

/// Source of an ordered sequence of `T` that ends in completion or a single
/// `E`.
///
/// Subscribing consumes the producer. A producer that finishes before
/// `subscribe` returns may hand back [`SubscriptionHandle::empty`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use streambridge::{Observer, Producer, SubscriptionHandle};
///
/// struct Countdown(u32);
///
/// impl Producer<u32, std::convert::Infallible> for Countdown {
///   fn subscribe(
///     self,
///     observer: Arc<dyn Observer<u32, std::convert::Infallible>>,
///   ) -> SubscriptionHandle {
///     for n in (1..=self.0).rev() {
///       observer.on_next(n);
///     }
///     observer.on_complete();
///     SubscriptionHandle::empty()
///   }
/// }
/// ```
pub trait Producer<T, E> {
  /// Attaches `observer` and starts delivery.
  fn subscribe(self, observer: Arc<dyn Observer<T, E>>) -> SubscriptionHandle;
}
