//! Typed, concurrent message pipelines over external queues.
//!
//! A [Stream] reads [Message]s from a [Source], runs them through a chain of stages (filter, map,
//! branch, fan-out, merge, ...) and terminates them in a [Sink]. Progress is committed back to
//! the source only after the sink wrote the messages, giving at-least-once delivery without
//! tracking retries per message.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use streams_core::sink::LogSink;
//! use streams_core::source::ChannelSource;
//! use streams_core::{Message, Result, Stream};
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let (tx, rx) = tokio::sync::mpsc::channel(10);
//! let stream = Stream::<String, String>::builder()
//!     .name("orders")
//!     .buffer(100)
//!     .timeout(Duration::from_millis(500))
//!     .build(ChannelSource::new("orders", rx))?;
//!
//! let handle = stream
//!     .filter("paid", |msg: &Message<String, String>| -> Result<bool> {
//!         Ok(msg.value().contains("paid"))
//!     })
//!     .sink("log", LogSink);
//!
//! tx.send(("42".to_string(), "paid".to_string())).await.unwrap();
//! drop(tx);
//! handle.error().await
//! # }
//! ```

pub use crate::error::{Error, Result};
pub use crate::message::{Marker, Message, Payload};
pub use crate::sink::Sink;
pub use crate::source::Source;
pub use crate::stream::{Predicate, Stream, StreamBuilder, StreamHandle, Transform};

mod error;

/// The unit flowing through a stream and its mark protocol.
pub mod message;

/// Where messages come from.
pub mod source;

/// Where messages end up.
pub mod sink;

pub mod stream;

/// Untyped stages over plain elements.
pub mod flow;

pub mod topology;

pub mod metrics;

pub mod config;

pub mod codec;

pub mod store;
