//! # Error Handling
//!
//! Error types for the bridge between push-based producers and the
//! request/response lifecycle.
//!
//! ## Overview
//!
//! Two families of failure exist in this crate:
//!
//! - **Producer errors** are generic (`E`) and flow through the bridge
//!   untouched. They are never wrapped by any type in this module.
//! - **Bridge errors** describe what can go wrong in the plumbing itself:
//!   event channel writes, configuration loading, and consuming a deferred
//!   outcome twice.
//!
//! Lifecycle races (a second completion, a cancellation that loses to a
//! completion) are not errors. They are reported as `false` returns and
//! logged at debug level.
//!
//! ## Core Types
//!
//! - **WriteError**: why an event channel refused a frame
//! - **BridgeError**: plumbing and configuration failures
//! - **StringError**: a message-only error, handy as a producer error type
//! - **ComponentInfo**: name and type of a sink, attached to log records

use std::fmt;

/// Reason an event channel rejected a frame.
///
/// A write failure is never retried. The streaming sink turns it into a
/// cancellation of the upstream subscription, and the channel keeps the
/// first failure so its owner can inspect it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
  /// The channel was closed, either by `close()` or because the client went away.
  #[error("event channel is closed")]
  Closed,
  /// The channel buffer is full; the client is not keeping up.
  #[error("event channel buffer is full")]
  Full,
  /// The value could not be encoded into an event payload.
  #[error("failed to encode event payload: {0}")]
  Encode(String),
}

/// Errors raised by the bridge plumbing.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
  /// The outcome of a deferred result was already taken by another waiter.
  #[error("deferred outcome was already taken")]
  OutcomeTaken,
  /// An event channel write failed.
  #[error(transparent)]
  Write(#[from] WriteError),
  /// A configuration value is out of range.
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
  /// A configuration document could not be parsed.
  #[error("failed to parse configuration: {0}")]
  Config(#[from] serde_json::Error),
}

/// A simple error type that wraps a string message.
///
/// This is useful for creating errors from string messages without
/// needing to implement a full error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringError(pub String);

impl StringError {
  /// Creates a new `StringError` from anything convertible into a `String`.
  pub fn new(message: impl Into<String>) -> Self {
    Self(message.into())
  }
}

impl fmt::Display for StringError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl std::error::Error for StringError {}

/// Information about a bridge component.
///
/// Carries the name and type of a sink so that log records emitted by the
/// subscriber can say which response they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
  /// The name of the component.
  pub name: String,
  /// The type name of the component.
  pub type_name: String,
}

impl Default for ComponentInfo {
  fn default() -> Self {
    Self {
      name: "default".to_string(),
      type_name: "default".to_string(),
    }
  }
}

impl ComponentInfo {
  /// Creates a `ComponentInfo` for `T`, using its type name for both fields
  /// unless a name is given.
  pub fn of<T: ?Sized>(name: Option<&str>) -> Self {
    let type_name = std::any::type_name::<T>().to_string();
    Self {
      name: name.map(str::to_string).unwrap_or_else(|| type_name.clone()),
      type_name,
    }
  }
}

impl fmt::Display for ComponentInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.name, self.type_name)
  }
}
