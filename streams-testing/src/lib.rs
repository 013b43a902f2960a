//! In-memory adapters for testing streams.
//!
//! Every adapter is cheap to clone, clones share their state, so a test keeps one clone to make
//! assertions while the stream owns the other. Failures and latency are injected through the
//! shared [ErrorInjector].
//!
//! # Example
//! ```ignore
//! use streams_core::Stream;
//! use streams_testing::{SimpleSink, SimpleSource};
//!
//! let source = SimpleSource::new("orders", vec![("a".to_string(), 1)]);
//! let sink = SimpleSink::new();
//! let handle = Stream::new(source.clone()).sink("sink", sink.clone());
//!
//! sink.error_injector().fail_writes(1); // next write fails
//! assert!(handle.error().await.is_err());
//! assert!(source.committed().is_empty());
//! ```

/// Error types of the adapters.
mod error;
/// Failure and latency injection.
mod error_injector;
/// Source fed from a vector or a channel.
mod simplesource;
/// Sink recording its writes.
mod simplesink;
/// Storage backed by a sorted map.
mod simplekvstore;
/// Tracing subscriber for tests.
mod setup_tracing;

pub use error::{Result, SimpleAdapterError};
pub use error_injector::ErrorInjector;
pub use setup_tracing::setup_tracing;
pub use simplekvstore::SimpleKvStore;
pub use simplesink::SimpleSink;
pub use simplesource::{CommitMode, SimpleSource};
