use crate::Result;
use crate::message::{Message, Payload};

/// [log] sink prints out the written messages through `tracing`.
mod log;
pub use log::LogSink;

/// A [blackhole] sink which accepts but never writes to anywhere, semantic equivalent of
/// `/dev/null`.
mod blackhole;
pub use blackhole::BlackholeSink;

/// [writer] sink writes the values, one per line, into an [AsyncWrite](tokio::io::AsyncWrite).
mod writer;
pub use writer::WriterSink;

/// [store] sink persists the values of the messages into a [Storage](crate::store::Storage).
mod store;
pub use store::StoreSink;

/// Set of items to be implemented to become a Sink.
#[trait_variant::make(Sink: Send)]
#[allow(dead_code)]
pub trait LocalSink<K: Payload, V: Payload> {
    /// Write the batch of messages to the Sink. The stream marks the messages only after this
    /// returns successfully.
    async fn write(&mut self, messages: &[Message<K, V>]) -> Result<()>;
}
