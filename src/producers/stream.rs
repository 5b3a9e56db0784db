//! Producer that drives a `futures::Stream` on a tokio task.
//!
//! Each `Ok` item becomes `on_next`, the first `Err` becomes `on_error`, and
//! the end of the stream becomes `on_complete`. Unsubscribing cancels the
//! driving task at its next suspension point; an item already being
//! delivered still reaches the observer.

use crate::observer::Observer;
use crate::producer::Producer;
use crate::subscription::SubscriptionHandle;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::Receiver;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Producer over a stream of `Result<T, E>`.
///
/// `subscribe` spawns the driving task on the configured runtime handle,
/// or on the current runtime when none was given. It therefore panics if
/// called outside a tokio runtime without a handle.
pub struct StreamProducer<S> {
  stream: S,
  runtime: Option<Handle>,
}

impl<S> StreamProducer<S> {
  /// Creates a producer over `stream`.
  pub fn new(stream: S) -> Self {
    Self {
      stream,
      runtime: None,
    }
  }

  /// Spawns the driving task on `runtime` instead of the current runtime.
  #[must_use]
  pub fn on_runtime(mut self, runtime: Handle) -> Self {
    self.runtime = Some(runtime);
    self
  }
}

impl<T, E> StreamProducer<ReceiverStream<Result<T, E>>> {
  /// Creates a producer fed by an mpsc receiver. The sequence completes when
  /// every sender has been dropped.
  pub fn from_receiver(receiver: Receiver<Result<T, E>>) -> Self {
    Self::new(ReceiverStream::new(receiver))
  }
}

impl<S, T, E> Producer<T, E> for StreamProducer<S>
where
  S: Stream<Item = Result<T, E>> + Send + 'static,
  T: Send + 'static,
  E: Send + 'static,
{
  fn subscribe(self, observer: Arc<dyn Observer<T, E>>) -> SubscriptionHandle {
    let token = CancellationToken::new();
    let handle = SubscriptionHandle::from_token(token.clone());
    observer.on_subscribe(handle.clone());

    let task = drive(self.stream, observer, token);
    match self.runtime {
      Some(runtime) => drop(runtime.spawn(task)),
      None => drop(tokio::spawn(task)),
    }
    handle
  }
}

async fn drive<S, T, E>(stream: S, observer: Arc<dyn Observer<T, E>>, token: CancellationToken)
where
  S: Stream<Item = Result<T, E>>,
{
  let mut stream = std::pin::pin!(stream);
  loop {
    let item = tokio::select! {
      biased;
      _ = token.cancelled() => {
        debug!("stream producer unsubscribed");
        return;
      }
      item = stream.next() => item,
    };
    match item {
      Some(Ok(value)) => {
        trace!("stream producer emitting value");
        observer.on_next(value);
      }
      Some(Err(error)) => {
        observer.on_error(error);
        return;
      }
      None => {
        observer.on_complete();
        return;
      }
    }
  }
}
