//! # Terminal Gate
//!
//! The single synchronization primitive behind exactly-once completion.
//!
//! A gate starts `Pending`. The first terminal path (complete, fail, or
//! cancel) to win the compare-and-swap moves it to `Completing`, performs
//! its side effects, then moves it to `Completed`. Every other terminal path
//! observes a non-pending gate and backs off. The intermediate state closes
//! the window in which two paths could both believe they won, and lets
//! value delivery refuse to start once any terminal path has claimed the
//! gate, even before that path has finished.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

const PENDING: u8 = 0;
const COMPLETING: u8 = 1;
const COMPLETED: u8 = 2;

/// Observable state of a [`TerminalGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
  /// No terminal action has been claimed.
  Pending,
  /// A terminal action has been claimed and is running.
  Completing,
  /// A terminal action has finished.
  Completed,
}

/// Atomic tri-state exactly-once gate.
pub struct TerminalGate {
  state: AtomicU8,
}

impl TerminalGate {
  /// Creates a pending gate.
  pub const fn new() -> Self {
    Self {
      state: AtomicU8::new(PENDING),
    }
  }

  /// Claims the gate. Returns `true` for exactly one caller over the
  /// lifetime of the gate.
  pub fn try_claim(&self) -> bool {
    self
      .state
      .compare_exchange(PENDING, COMPLETING, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// Marks the claimed terminal action as finished.
  pub fn finish(&self) {
    self.state.store(COMPLETED, Ordering::Release);
  }

  /// Returns whether no terminal action has been claimed yet.
  pub fn is_pending(&self) -> bool {
    self.state.load(Ordering::Acquire) == PENDING
  }

  /// Returns the current state.
  pub fn state(&self) -> GateState {
    match self.state.load(Ordering::Acquire) {
      PENDING => GateState::Pending,
      COMPLETING => GateState::Completing,
      _ => GateState::Completed,
    }
  }
}

impl Default for TerminalGate {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for TerminalGate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("TerminalGate").field(&self.state()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Barrier};
  use std::thread;

  #[test]
  fn test_lifecycle() {
    let gate = TerminalGate::new();
    assert_eq!(gate.state(), GateState::Pending);
    assert!(gate.is_pending());

    assert!(gate.try_claim());
    assert_eq!(gate.state(), GateState::Completing);
    assert!(!gate.is_pending());

    gate.finish();
    assert_eq!(gate.state(), GateState::Completed);
  }

  #[test]
  fn test_second_claim_loses() {
    let gate = TerminalGate::new();
    assert!(gate.try_claim());
    assert!(!gate.try_claim());
    gate.finish();
    assert!(!gate.try_claim());
  }

  #[test]
  fn test_single_winner_across_threads() {
    for _ in 0..50 {
      let gate = Arc::new(TerminalGate::new());
      let barrier = Arc::new(Barrier::new(4));
      let joins: Vec<_> = (0..4)
        .map(|_| {
          let gate = Arc::clone(&gate);
          let barrier = Arc::clone(&barrier);
          thread::spawn(move || {
            barrier.wait();
            gate.try_claim()
          })
        })
        .collect();

      let winners = joins
        .into_iter()
        .map(|join| join.join().unwrap())
        .filter(|won| *won)
        .count();
      assert_eq!(winners, 1);
    }
  }
}
