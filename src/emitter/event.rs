//! Server-sent event framing.

use serde::Serialize;

/// One server-sent event.
///
/// Rendered with [`SseEvent::to_sse_format`] as the `event:`, `id:` and
/// `retry:` fields (when set) followed by one `data:` line per line of
/// payload and a blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
  /// Event name (`event:` field).
  pub event: Option<String>,
  /// Payload (`data:` field).
  pub data: String,
  /// Event id (`id:` field).
  pub id: Option<String>,
  /// Reconnection delay in milliseconds (`retry:` field).
  pub retry: Option<u64>,
}

impl SseEvent {
  /// Creates an event with the given payload and no other fields.
  pub fn new(data: impl Into<String>) -> Self {
    Self {
      event: None,
      data: data.into(),
      id: None,
      retry: None,
    }
  }

  /// Creates an event whose payload is `value` encoded as JSON.
  pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
    serde_json::to_string(value).map(Self::new)
  }

  /// Sets the event name.
  #[must_use]
  pub fn with_event(mut self, event: impl Into<String>) -> Self {
    self.event = Some(event.into());
    self
  }

  /// Sets the event id.
  #[must_use]
  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = Some(id.into());
    self
  }

  /// Sets the reconnection delay.
  #[must_use]
  pub fn with_retry(mut self, retry: u64) -> Self {
    self.retry = Some(retry);
    self
  }

  /// Renders the event in `text/event-stream` format.
  pub fn to_sse_format(&self) -> String {
    let mut sse_text = String::new();

    if let Some(event) = &self.event {
      sse_text.push_str(&format!("event: {}\n", event));
    }
    if let Some(id) = &self.id {
      sse_text.push_str(&format!("id: {}\n", id));
    }
    if let Some(retry) = self.retry {
      sse_text.push_str(&format!("retry: {}\n", retry));
    }

    // A bare newline inside data would end the event early.
    for line in self.data.split('\n') {
      sse_text.push_str(&format!("data: {}\n", line.trim_end_matches('\r')));
    }
    sse_text.push('\n');
    sse_text
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_data_only() {
    assert_eq!(SseEvent::new("hello").to_sse_format(), "data: hello\n\n");
  }

  #[test]
  fn test_all_fields() {
    let event = SseEvent::new("payload")
      .with_event("update")
      .with_id("7")
      .with_retry(3000);

    assert_eq!(
      event.to_sse_format(),
      "event: update\nid: 7\nretry: 3000\ndata: payload\n\n"
    );
  }

  #[test]
  fn test_multiline_data_is_split() {
    let event = SseEvent::new("first\r\nsecond\nthird");
    assert_eq!(
      event.to_sse_format(),
      "data: first\ndata: second\ndata: third\n\n"
    );
  }

  #[test]
  fn test_json_payload() {
    #[derive(Serialize)]
    struct Reading {
      sensor: &'static str,
      value: i32,
    }

    let event = SseEvent::json(&Reading {
      sensor: "a",
      value: 3,
    })
    .unwrap();
    assert_eq!(event.data, r#"{"sensor":"a","value":3}"#);
  }
}
