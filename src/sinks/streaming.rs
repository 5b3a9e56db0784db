//! # Streaming Sink
//!
//! Forwards every value to an [`EventChannel`] the moment it arrives, for
//! producers that are long running or unbounded.
//!
//! - Each value becomes one [`Frame::Event`] carrying the value as JSON,
//!   optionally named and numbered.
//! - Completion writes [`Frame::Complete`] and closes the channel; an error
//!   writes [`Frame::Error`] and closes it.
//! - Frames are written in exactly the order values arrive. The sink never
//!   queues: if the channel refuses a frame, the failure is returned to the
//!   subscriber, which cancels the subscription.

use crate::config::EmitterConfig;
use crate::emitter::{EventChannel, Frame, SseEvent};
use crate::error::{ComponentInfo, WriteError};
use crate::sink::ResponseSink;
use serde::Serialize;
use std::fmt::{self, Display};
use tracing::{debug, trace, warn};

/// Sink that writes one event per value to channel `C`.
pub struct StreamingSink<C> {
  channel: C,
  event_name: Option<String>,
  event_ids: bool,
  next_id: u64,
  name: Option<String>,
}

impl<C: EventChannel> StreamingSink<C> {
  /// Creates a sink writing plain data events to `channel`.
  pub fn new(channel: C) -> Self {
    Self {
      channel,
      event_name: None,
      event_ids: false,
      next_id: 0,
      name: None,
    }
  }

  /// Creates a sink using the framing options of `config`.
  pub fn from_config(channel: C, config: &EmitterConfig) -> Self {
    let sink = Self::new(channel).with_event_ids(config.event_ids);
    match &config.event_name {
      Some(name) => sink.with_event_name(name.clone()),
      None => sink,
    }
  }

  /// Names every data event.
  #[must_use]
  pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
    self.event_name = Some(name.into());
    self
  }

  /// Numbers data events from zero.
  #[must_use]
  pub fn with_event_ids(mut self, enabled: bool) -> Self {
    self.event_ids = enabled;
    self
  }

  /// Sets the name used in log records.
  #[must_use]
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Writes `value` as one event.
  pub fn forward<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), WriteError> {
    let mut event =
      SseEvent::json(value).map_err(|error| WriteError::Encode(error.to_string()))?;
    if let Some(name) = &self.event_name {
      event = event.with_event(name.as_str());
    }
    if self.event_ids {
      event = event.with_id(self.next_id.to_string());
    }
    self.channel.write(Frame::Event(event))?;
    trace!(id = self.next_id, "event forwarded");
    self.next_id += 1;
    Ok(())
  }

  /// Writes the completion frame and closes the channel.
  pub fn finish(&mut self) {
    debug!(events = self.next_id, "stream complete");
    if let Err(error) = self.channel.write(Frame::Complete) {
      debug!(%error, "completion frame not written");
    }
    self.channel.close();
  }

  /// Writes an error frame for `error` and closes the channel.
  pub fn fail<E: Display + ?Sized>(&mut self, error: &E) {
    debug!(%error, "stream failed");
    if let Err(write_error) = self.channel.write(Frame::Error(error.to_string())) {
      debug!(error = %write_error, "error frame not written");
    }
    self.channel.close();
  }

  /// Returns the number of events forwarded so far.
  pub fn forwarded(&self) -> u64 {
    self.next_id
  }

  /// Returns the channel this sink writes to.
  pub fn channel(&self) -> &C {
    &self.channel
  }
}

impl<T, E, C> ResponseSink<T, E> for StreamingSink<C>
where
  T: Serialize,
  E: Display,
  C: EventChannel,
{
  fn on_value(&mut self, value: T) -> Result<(), WriteError> {
    self.forward(&value)
  }

  fn on_complete(&mut self) {
    self.finish();
  }

  fn on_error(&mut self, error: E) {
    self.fail(&error);
  }

  fn abort(&mut self, error: &WriteError) {
    warn!(%error, "stream aborted");
    // The channel itself is healthy when only the value failed to encode,
    // so the client still learns why the stream ends.
    if let WriteError::Encode(_) = error {
      if let Err(write_error) = self.channel.write(Frame::Error(error.to_string())) {
        debug!(error = %write_error, "error frame not written");
      }
    }
    self.channel.close();
  }

  fn component_info(&self) -> ComponentInfo {
    ComponentInfo::of::<Self>(self.name.as_deref())
  }
}

impl<C: fmt::Debug> fmt::Debug for StreamingSink<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StreamingSink")
      .field("channel", &self.channel)
      .field("event_name", &self.event_name)
      .field("event_ids", &self.event_ids)
      .field("forwarded", &self.next_id)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::StringError;
  use std::collections::BTreeMap;
  use std::sync::{Arc, Mutex};

  #[derive(Default)]
  struct Recorded {
    frames: Vec<Frame>,
    closes: usize,
    refuse: Option<WriteError>,
  }

  #[derive(Clone, Default)]
  struct RecordingChannel(Arc<Mutex<Recorded>>);

  impl EventChannel for RecordingChannel {
    fn write(&self, frame: Frame) -> Result<(), WriteError> {
      let mut recorded = self.0.lock().unwrap();
      if recorded.closes > 0 {
        return Err(WriteError::Closed);
      }
      if let Some(error) = recorded.refuse.clone() {
        return Err(error);
      }
      recorded.frames.push(frame);
      Ok(())
    }

    fn close(&self) {
      self.0.lock().unwrap().closes += 1;
    }

    fn on_disconnect(&self, _callback: Box<dyn FnOnce() + Send>) {}
  }

  fn data(payload: &str) -> Frame {
    Frame::Event(SseEvent::new(payload))
  }

  #[test]
  fn test_forward_then_finish() {
    let channel = RecordingChannel::default();
    let mut sink = StreamingSink::new(channel.clone());

    sink.forward("a").unwrap();
    sink.forward("b").unwrap();
    sink.finish();

    let recorded = channel.0.lock().unwrap();
    assert_eq!(
      recorded.frames,
      vec![data(r#""a""#), data(r#""b""#), Frame::Complete]
    );
    assert_eq!(recorded.closes, 1);
  }

  #[test]
  fn test_fail_writes_error_frame() {
    let channel = RecordingChannel::default();
    let mut sink = StreamingSink::new(channel.clone());

    sink.forward(&1).unwrap();
    sink.fail(&StringError::new("upstream down"));

    let recorded = channel.0.lock().unwrap();
    assert_eq!(
      recorded.frames,
      vec![data("1"), Frame::Error("upstream down".to_string())]
    );
    assert_eq!(recorded.closes, 1);
  }

  #[test]
  fn test_event_names_and_ids() {
    let channel = RecordingChannel::default();
    let config = EmitterConfig::default()
      .with_event_name("reading")
      .with_event_ids(true);
    let mut sink = StreamingSink::from_config(channel.clone(), &config);

    sink.forward(&10).unwrap();
    sink.forward(&20).unwrap();
    assert_eq!(sink.forwarded(), 2);

    let recorded = channel.0.lock().unwrap();
    assert_eq!(
      recorded.frames,
      vec![
        Frame::Event(SseEvent::new("10").with_event("reading").with_id("0")),
        Frame::Event(SseEvent::new("20").with_event("reading").with_id("1")),
      ]
    );
  }

  #[test]
  fn test_refused_write_is_reported() {
    let channel = RecordingChannel::default();
    channel.0.lock().unwrap().refuse = Some(WriteError::Full);
    let mut sink = StreamingSink::new(channel.clone());

    assert_eq!(sink.forward(&1), Err(WriteError::Full));
    assert_eq!(sink.forwarded(), 0);
  }

  #[test]
  fn test_encode_failure_aborts_with_error_frame() {
    let channel = RecordingChannel::default();
    let mut sink = StreamingSink::new(channel.clone());

    // JSON object keys must be strings.
    let mut bad = BTreeMap::new();
    bad.insert(vec![1u8], 1);
    let error = sink.forward(&bad).unwrap_err();
    assert!(matches!(error, WriteError::Encode(_)));

    ResponseSink::<BTreeMap<Vec<u8>, i32>, StringError>::abort(&mut sink, &error);
    let recorded = channel.0.lock().unwrap();
    assert_eq!(recorded.frames.len(), 1);
    assert!(matches!(recorded.frames[0], Frame::Error(_)));
    assert_eq!(recorded.closes, 1);
  }

  #[test]
  fn test_abort_on_closed_channel_only_closes() {
    let channel = RecordingChannel::default();
    let mut sink = StreamingSink::new(channel.clone());

    ResponseSink::<i32, StringError>::abort(&mut sink, &WriteError::Closed);
    let recorded = channel.0.lock().unwrap();
    assert!(recorded.frames.is_empty());
    assert_eq!(recorded.closes, 1);
  }
}
