//! The multi-shot output a streaming sink writes to.

use super::event::SseEvent;
use crate::error::WriteError;
use bytes::Bytes;

/// Name of the event that marks normal end of stream.
pub const COMPLETE_EVENT: &str = "complete";
/// Name of the event that carries a producer error.
pub const ERROR_EVENT: &str = "error";

/// One unit written to an [`EventChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
  /// A value forwarded from the producer.
  Event(SseEvent),
  /// The producer completed normally.
  Complete,
  /// The producer failed; carries the rendered error.
  Error(String),
  /// A comment line, used for keep-alives.
  Comment(String),
}

impl Frame {
  /// Returns whether this frame ends the stream.
  pub fn is_terminal(&self) -> bool {
    matches!(self, Frame::Complete | Frame::Error(_))
  }

  /// Renders the frame in `text/event-stream` format.
  pub fn to_sse_format(&self) -> String {
    match self {
      Frame::Event(event) => event.to_sse_format(),
      Frame::Complete => SseEvent::new("").with_event(COMPLETE_EVENT).to_sse_format(),
      Frame::Error(message) => SseEvent::new(message.as_str())
        .with_event(ERROR_EVENT)
        .to_sse_format(),
      Frame::Comment(comment) => format!(": {}\n\n", comment),
    }
  }

  /// Renders the frame into bytes ready for the response body.
  pub fn to_bytes(&self) -> Bytes {
    Bytes::from(self.to_sse_format())
  }
}

/// Multi-shot emission primitive owned by the request layer.
///
/// Writes after `close` are rejected with [`WriteError::Closed`].
pub trait EventChannel: Send + Sync {
  /// Writes one frame without blocking.
  fn write(&self, frame: Frame) -> Result<(), WriteError>;

  /// Closes the channel. Closing an already closed channel has no effect.
  fn close(&self);

  /// Registers a callback to run when the client disconnects.
  ///
  /// The callback may run on any thread, including from inside a `write`
  /// that found the client gone.
  fn on_disconnect(&self, callback: Box<dyn FnOnce() + Send>);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_terminal_frames() {
    assert!(Frame::Complete.is_terminal());
    assert!(Frame::Error("x".to_string()).is_terminal());
    assert!(!Frame::Event(SseEvent::new("x")).is_terminal());
    assert!(!Frame::Comment("keep-alive".to_string()).is_terminal());
  }

  #[test]
  fn test_frame_rendering() {
    assert_eq!(
      Frame::Complete.to_sse_format(),
      "event: complete\ndata: \n\n"
    );
    assert_eq!(
      Frame::Error("upstream failed".to_string()).to_sse_format(),
      "event: error\ndata: upstream failed\n\n"
    );
    assert_eq!(
      Frame::Comment("keep-alive".to_string()).to_bytes(),
      Bytes::from_static(b": keep-alive\n\n")
    );
  }
}
