//! Producer implementations.

/// Synchronous producer over an iterator.
pub mod iter;
/// Tokio-driven producer over a `futures::Stream`.
pub mod stream;

pub use iter::IterProducer;
pub use stream::StreamProducer;
