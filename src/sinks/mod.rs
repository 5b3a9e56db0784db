//! Response sink implementations.

/// Buffer-everything delivery into a deferred result.
pub mod aggregating;
/// Event-per-value delivery into an event channel.
pub mod streaming;

pub use aggregating::AggregatingSink;
pub use streaming::StreamingSink;
