//! # Configuration
//!
//! Settings the request layer hands to the bridge when it attaches a
//! producer. Every struct has sensible defaults and `with_*` builders, and
//! deserializes from JSON so it can live next to the rest of a service's
//! configuration.
//!
//! Durations are carried as milliseconds.
//!
//! ```rust
//! use streambridge::config::{BridgeConfig, DeliveryMode};
//!
//! let config = BridgeConfig::from_json(
//!   r#"{ "mode": "streaming", "emitter": { "keep_alive_ms": 15000 } }"#,
//! )?;
//! assert_eq!(config.mode, DeliveryMode::Streaming);
//! # Ok::<(), streambridge::BridgeError>(())
//! ```

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of the bounded frame buffer behind an SSE emitter.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// How values from a producer reach the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
  /// Buffer every value and complete a deferred result with the whole
  /// sequence once the producer completes.
  ///
  /// Nothing is visible until completion and the buffer is unbounded, so
  /// long running or infinite producers should use `Streaming` instead.
  #[default]
  Aggregating,
  /// Forward every value as its own server-sent event.
  Streaming,
}

/// Settings for a deferred (single-shot) result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferredConfig {
  /// Time after which the result expires. `None` waits forever.
  pub timeout_ms: Option<u64>,
}

impl DeferredConfig {
  /// Sets the expiry timeout.
  #[must_use]
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout_ms = Some(duration_millis(timeout));
    self
  }

  /// Returns the expiry timeout, if any.
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_ms.map(Duration::from_millis)
  }
}

/// Settings for a server-sent event emitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
  /// Number of frames buffered before writes start failing with `Full`.
  pub buffer_size: usize,
  /// Interval between keep-alive comments. `None` disables them.
  pub keep_alive_ms: Option<u64>,
  /// Time after which the emitter times out and closes. `None` waits forever.
  pub timeout_ms: Option<u64>,
  /// Event name written on every data frame (`event:` field).
  pub event_name: Option<String>,
  /// Whether data frames carry a sequential `id:` field.
  pub event_ids: bool,
}

impl Default for EmitterConfig {
  fn default() -> Self {
    Self {
      buffer_size: DEFAULT_BUFFER_SIZE,
      keep_alive_ms: None,
      timeout_ms: None,
      event_name: None,
      event_ids: false,
    }
  }
}

impl EmitterConfig {
  /// Sets the frame buffer capacity.
  #[must_use]
  pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
    self.buffer_size = buffer_size;
    self
  }

  /// Enables keep-alive comments at the given interval.
  #[must_use]
  pub fn with_keep_alive(mut self, interval: Duration) -> Self {
    self.keep_alive_ms = Some(duration_millis(interval));
    self
  }

  /// Sets the emitter timeout.
  #[must_use]
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout_ms = Some(duration_millis(timeout));
    self
  }

  /// Sets the event name written on data frames.
  #[must_use]
  pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
    self.event_name = Some(name.into());
    self
  }

  /// Enables sequential event ids on data frames.
  #[must_use]
  pub fn with_event_ids(mut self, enabled: bool) -> Self {
    self.event_ids = enabled;
    self
  }

  /// Returns the keep-alive interval, if enabled.
  pub fn keep_alive(&self) -> Option<Duration> {
    self.keep_alive_ms.map(Duration::from_millis)
  }

  /// Returns the emitter timeout, if any.
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_ms.map(Duration::from_millis)
  }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
  /// Delivery policy used by `ObservableResponse::attach`.
  pub mode: DeliveryMode,
  /// Settings for aggregating responses.
  pub deferred: DeferredConfig,
  /// Settings for streaming responses.
  pub emitter: EmitterConfig,
}

impl BridgeConfig {
  /// Sets the delivery mode.
  #[must_use]
  pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
    self.mode = mode;
    self
  }

  /// Replaces the deferred result settings.
  #[must_use]
  pub fn with_deferred(mut self, deferred: DeferredConfig) -> Self {
    self.deferred = deferred;
    self
  }

  /// Replaces the emitter settings.
  #[must_use]
  pub fn with_emitter(mut self, emitter: EmitterConfig) -> Self {
    self.emitter = emitter;
    self
  }

  /// Parses and validates a JSON configuration document.
  pub fn from_json(json: &str) -> Result<Self, BridgeError> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Checks that every value is usable.
  pub fn validate(&self) -> Result<(), BridgeError> {
    if self.emitter.buffer_size == 0 {
      return Err(BridgeError::InvalidConfig(
        "emitter.buffer_size must be greater than zero".to_string(),
      ));
    }
    let durations = [
      ("deferred.timeout_ms", self.deferred.timeout_ms),
      ("emitter.keep_alive_ms", self.emitter.keep_alive_ms),
      ("emitter.timeout_ms", self.emitter.timeout_ms),
    ];
    for (field, value) in durations {
      if value == Some(0) {
        return Err(BridgeError::InvalidConfig(format!(
          "{} must be greater than zero",
          field
        )));
      }
    }
    Ok(())
  }
}

fn duration_millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = BridgeConfig::default();
    assert_eq!(config.mode, DeliveryMode::Aggregating);
    assert_eq!(config.deferred.timeout(), None);
    assert_eq!(config.emitter.buffer_size, DEFAULT_BUFFER_SIZE);
    assert_eq!(config.emitter.keep_alive(), None);
    assert!(!config.emitter.event_ids);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_builder_chain() {
    let config = BridgeConfig::default()
      .with_mode(DeliveryMode::Streaming)
      .with_deferred(DeferredConfig::default().with_timeout(Duration::from_secs(30)))
      .with_emitter(
        EmitterConfig::default()
          .with_buffer_size(8)
          .with_keep_alive(Duration::from_millis(1500))
          .with_event_name("tick")
          .with_event_ids(true),
      );

    assert_eq!(config.mode, DeliveryMode::Streaming);
    assert_eq!(config.deferred.timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.emitter.buffer_size, 8);
    assert_eq!(config.emitter.keep_alive(), Some(Duration::from_millis(1500)));
    assert_eq!(config.emitter.event_name.as_deref(), Some("tick"));
    assert!(config.emitter.event_ids);
  }

  #[test]
  fn test_from_json_partial_document() {
    let config = BridgeConfig::from_json(
      r#"{ "mode": "streaming", "emitter": { "timeout_ms": 2000 } }"#,
    )
    .unwrap();

    assert_eq!(config.mode, DeliveryMode::Streaming);
    assert_eq!(config.emitter.timeout(), Some(Duration::from_secs(2)));
    assert_eq!(config.emitter.buffer_size, DEFAULT_BUFFER_SIZE);
  }

  #[test]
  fn test_from_json_rejects_zero_buffer() {
    let err = BridgeConfig::from_json(r#"{ "emitter": { "buffer_size": 0 } }"#).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidConfig(_)));
  }

  #[test]
  fn test_from_json_rejects_zero_duration() {
    let err = BridgeConfig::from_json(r#"{ "deferred": { "timeout_ms": 0 } }"#).unwrap_err();
    match err {
      BridgeError::InvalidConfig(message) => assert!(message.contains("deferred.timeout_ms")),
      other => panic!("Expected InvalidConfig, got {:?}", other),
    }
  }

  #[test]
  fn test_from_json_malformed() {
    let err = BridgeConfig::from_json("{ mode: ").unwrap_err();
    assert!(matches!(err, BridgeError::Config(_)));
  }

  #[test]
  fn test_unknown_mode_is_rejected() {
    assert!(BridgeConfig::from_json(r#"{ "mode": "batched" }"#).is_err());
  }
}
