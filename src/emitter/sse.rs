//! # SSE Emitter
//!
//! [`SseEmitter`] is the event channel handed to streaming responses. The
//! request layer keeps the receiving half of a bounded tokio channel and
//! copies frames into the response body; the bridge writes frames through
//! [`EventChannel::write`].
//!
//! ## Behaviour
//!
//! - `write` never blocks. A full buffer fails with [`WriteError::Full`], a
//!   closed emitter or a dropped receiver with [`WriteError::Closed`]. The
//!   first failure is recorded (see [`SseEmitter::failure`]) and closes the
//!   emitter, so its owner can tell a clean end of stream from an aborted one.
//! - When created inside a tokio runtime, a watcher task sends keep-alive
//!   comments, notices the client going away (receiver dropped) and enforces
//!   the emitter timeout. Disconnect and timeout callbacks run on that task.
//! - `close` is idempotent; dropping every clone of the emitter also closes it.

use super::channel::{EventChannel, Frame};
use crate::config::EmitterConfig;
use crate::error::WriteError;
use http::HeaderMap;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use std::fmt;
use std::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type Callback = Box<dyn FnOnce() + Send>;

/// Comment text of keep-alive frames.
pub const KEEP_ALIVE_COMMENT: &str = "keep-alive";

#[derive(Default)]
struct EmitterState {
  sender: Option<Sender<Frame>>,
  failure: Option<WriteError>,
  disconnected: bool,
  timed_out: bool,
  disconnect_callbacks: Vec<Callback>,
  timeout_callbacks: Vec<Callback>,
}

struct Shared {
  state: Mutex<EmitterState>,
  shutdown: CancellationToken,
}

impl Drop for Shared {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

/// Server-sent event channel backed by a bounded tokio mpsc channel.
///
/// Cloning yields another reference to the same emitter.
#[derive(Clone)]
pub struct SseEmitter {
  shared: Arc<Shared>,
}

impl SseEmitter {
  /// Creates an emitter and the receiver its frames arrive on.
  pub fn new(config: &EmitterConfig) -> (Self, Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
    let shared = Arc::new(Shared {
      state: Mutex::new(EmitterState {
        sender: Some(tx.clone()),
        ..EmitterState::default()
      }),
      shutdown: CancellationToken::new(),
    });

    match tokio::runtime::Handle::try_current() {
      Ok(runtime) => {
        runtime.spawn(watch(
          Arc::downgrade(&shared),
          tx,
          shared.shutdown.clone(),
          config.keep_alive(),
          config.timeout(),
        ));
      }
      Err(_) => {
        debug!("no tokio runtime, sse emitter runs without keep-alive or disconnect detection");
      }
    }

    (Self { shared }, rx)
  }

  /// Writes one frame without blocking.
  pub fn send(&self, frame: Frame) -> Result<(), WriteError> {
    let mut state = self.lock();
    let Some(sender) = state.sender.as_ref() else {
      return Err(WriteError::Closed);
    };
    let error = match sender.try_send(frame) {
      Ok(()) => return Ok(()),
      Err(TrySendError::Full(_)) => {
        warn!("sse emitter buffer full, aborting stream");
        WriteError::Full
      }
      Err(TrySendError::Closed(_)) => {
        warn!("sse client disconnected");
        state.disconnected = true;
        WriteError::Closed
      }
    };
    state.failure.get_or_insert(error.clone());
    state.sender = None;
    drop(state);
    self.shared.shutdown.cancel();
    Err(error)
  }

  /// Closes the emitter. Returns `true` if this call closed it.
  ///
  /// Frames already written stay readable; the receiver yields `None` after
  /// the last of them.
  pub fn complete(&self) -> bool {
    let was_open = self.lock().sender.take().is_some();
    if was_open {
      debug!("sse emitter closed");
      self.shared.shutdown.cancel();
    }
    was_open
  }

  /// Returns whether the emitter is closed.
  pub fn is_closed(&self) -> bool {
    self.lock().sender.is_none()
  }

  /// Returns the first write failure, if any.
  pub fn failure(&self) -> Option<WriteError> {
    self.lock().failure.clone()
  }

  /// Returns whether the client went away.
  pub fn is_disconnected(&self) -> bool {
    self.lock().disconnected
  }

  /// Returns whether the emitter timed out.
  pub fn is_timed_out(&self) -> bool {
    self.lock().timed_out
  }

  /// Registers a callback for client disconnect. Runs immediately if the
  /// client is already gone.
  pub fn on_disconnect<F>(&self, callback: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let mut state = self.lock();
    if state.disconnected {
      drop(state);
      callback();
    } else {
      state.disconnect_callbacks.push(Box::new(callback));
    }
  }

  /// Registers a callback for emitter timeout. Runs immediately if the
  /// emitter already timed out.
  pub fn on_timeout<F>(&self, callback: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let mut state = self.lock();
    if state.timed_out {
      drop(state);
      callback();
    } else {
      state.timeout_callbacks.push(Box::new(callback));
    }
  }

  /// Headers for a `text/event-stream` response.
  pub fn response_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(mime::TEXT_EVENT_STREAM.as_ref()) {
      headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
  }

  fn keep_alive(&self) {
    let mut state = self.lock();
    let Some(sender) = state.sender.as_ref() else {
      return;
    };
    // Frames are still queued; the client does not need a keep-alive, and
    // queueing one would take buffer space from data.
    if sender.capacity() < sender.max_capacity() {
      return;
    }
    match sender.try_send(Frame::Comment(KEEP_ALIVE_COMMENT.to_string())) {
      Ok(()) => trace!("sse keep-alive sent"),
      Err(TrySendError::Full(_)) => {}
      Err(TrySendError::Closed(_)) => {
        state.disconnected = true;
        state.sender = None;
      }
    }
  }

  fn client_gone(&self) -> bool {
    let state = self.lock();
    state.disconnected || state.sender.as_ref().is_some_and(Sender::is_closed)
  }

  fn disconnected(&self) {
    let callbacks = {
      let mut state = self.lock();
      state.disconnected = true;
      state.sender = None;
      std::mem::take(&mut state.disconnect_callbacks)
    };
    if !callbacks.is_empty() {
      debug!(callbacks = callbacks.len(), "sse client disconnected");
    }
    for callback in callbacks {
      callback();
    }
  }

  fn timed_out(&self) {
    let callbacks = {
      let mut state = self.lock();
      if state.sender.is_none() {
        return;
      }
      state.timed_out = true;
      std::mem::take(&mut state.timeout_callbacks)
    };
    debug!(callbacks = callbacks.len(), "sse emitter timed out");
    for callback in callbacks {
      callback();
    }
    self.complete();
  }

  fn lock(&self) -> MutexGuard<'_, EmitterState> {
    self
      .shared
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

impl EventChannel for SseEmitter {
  fn write(&self, frame: Frame) -> Result<(), WriteError> {
    self.send(frame)
  }

  fn close(&self) {
    self.complete();
  }

  fn on_disconnect(&self, callback: Box<dyn FnOnce() + Send>) {
    SseEmitter::on_disconnect(self, callback);
  }
}

impl fmt::Debug for SseEmitter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.lock();
    f.debug_struct("SseEmitter")
      .field("closed", &state.sender.is_none())
      .field("failure", &state.failure)
      .field("disconnected", &state.disconnected)
      .field("timed_out", &state.timed_out)
      .finish()
  }
}

async fn watch(
  shared: Weak<Shared>,
  sender: Sender<Frame>,
  shutdown: CancellationToken,
  keep_alive: Option<Duration>,
  timeout: Option<Duration>,
) {
  let deadline = timeout.map(|timeout| Instant::now() + timeout);
  let mut ticker = keep_alive.map(|period| {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
  });

  loop {
    tokio::select! {
      biased;
      _ = shutdown.cancelled() => break,
      _ = sender.closed() => break,
      _ = sleep_until(deadline) => {
        if let Some(emitter) = upgrade(&shared) {
          emitter.timed_out();
        }
        break;
      }
      _ = tick(&mut ticker) => match upgrade(&shared) {
        Some(emitter) => emitter.keep_alive(),
        None => break,
      },
    }
  }
  drop(sender);

  if let Some(emitter) = upgrade(&shared) {
    if emitter.client_gone() {
      emitter.disconnected();
    }
  }
}

fn upgrade(shared: &Weak<Shared>) -> Option<SseEmitter> {
  shared.upgrade().map(|shared| SseEmitter { shared })
}

async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => future::pending().await,
  }
}

async fn tick(ticker: &mut Option<Interval>) {
  match ticker {
    Some(interval) => {
      interval.tick().await;
    }
    None => future::pending().await,
  }
}
