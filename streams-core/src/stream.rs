//! A [Stream] wires a [Source] to a chain of stages and terminates in a [Sink](crate::sink::Sink).
//!
//! ```text
//! (source) --> [forwarder] --> (filter) --> (map) --> (sink) ==write==> mark
//!                                                                        |
//!      ^------------------------- commit <---- [committer] <-- [marker queue]
//! ```
//!
//! Every stage is its own tokio task, connected to its neighbours by bounded channels, so a slow
//! stage stalls its upstream all the way back to the source. Messages are committed back to the
//! source only after they got marked, i.e. after the sink wrote them (or a stage dropped them on
//! purpose), which gives at-least-once delivery.
//!
//! Any stage failing tears down the whole stream. The first error is kept and returned by
//! [StreamHandle::error].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::Result;
use crate::config::StreamConfig;
use crate::message::{Marker, Message, Payload};
use crate::metrics::Monitor;
use crate::source::Source;
use crate::topology::{Node, Topology};

mod engine;
use engine::Shared;

/// Single message stages: filter, map, inspect, log and mark.
mod ops;

/// Branch, fan-out and merge.
mod routing;

/// Terminal stages, including the batching sink stage.
mod terminal;

/// Decides whether a message goes on. Implemented by closures too.
pub trait Predicate<K, V>: Send + 'static {
    fn test(&mut self, msg: &Message<K, V>) -> Result<bool>;
}

impl<K, V, F> Predicate<K, V> for F
where
    F: FnMut(&Message<K, V>) -> Result<bool> + Send + 'static,
{
    fn test(&mut self, msg: &Message<K, V>) -> Result<bool> {
        self(msg)
    }
}

/// Replaces a message with a new one. Implemented by closures too.
pub trait Transform<K, V>: Send + 'static {
    fn apply(&mut self, msg: Message<K, V>) -> Result<Message<K, V>>;
}

impl<K, V, F> Transform<K, V> for F
where
    F: FnMut(Message<K, V>) -> Result<Message<K, V>> + Send + 'static,
{
    fn apply(&mut self, msg: Message<K, V>) -> Result<Message<K, V>> {
        self(msg)
    }
}

/// A stream of messages at some point of the pipeline. Attaching a stage consumes the stream
/// and returns the stream of the stage's output.
pub struct Stream<K, V> {
    shared: Arc<Shared>,
    node: Node,
    rx: mpsc::Receiver<Message<K, V>>,
}

impl<K: Payload, V: Payload> Stream<K, V> {
    /// Starts a stream with the default options. Must be called within a tokio runtime.
    pub fn new<S>(source: S) -> Self
    where
        S: Source<K, V> + Send + Sync + 'static,
    {
        Self::start(source, StreamConfig::default())
    }

    /// Starts a stream with the given options. Must be called within a tokio runtime.
    pub fn with_config<S>(source: S, config: StreamConfig) -> Result<Self>
    where
        S: Source<K, V> + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self::start(source, config))
    }

    pub fn builder() -> StreamBuilder {
        StreamBuilder::new()
    }

    fn start<S>(source: S, config: StreamConfig) -> Self
    where
        S: Source<K, V> + Send + Sync + 'static,
    {
        let root = Node::new(config.name.clone());
        let shared = Arc::new(Shared::new(config, root.clone()));

        let (marker, marks) = Marker::channel();
        let source = Arc::new(source);
        let input = source.messages(marker);

        let (tx, rx) = shared.channel();
        shared.spawn(engine::forward(
            Arc::clone(&shared),
            Arc::clone(&source),
            input,
            tx,
        ));
        shared.start_committer(source, marks);

        Stream {
            shared,
            node: root,
            rx,
        }
    }

    /// Appends a node for a new stage under this stream's node. Nodes are always attached
    /// before the stage's task is spawned.
    fn attach(&self, name: &str) -> Node {
        let node = Node::new(name);
        self.node.add_child(node.clone());
        node
    }

    fn derive(&self, node: Node, rx: mpsc::Receiver<Message<K, V>>) -> Self {
        Stream {
            shared: Arc::clone(&self.shared),
            node,
            rx,
        }
    }

    /// Node of the stage producing this stream.
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn topology(&self) -> Topology {
        Topology::new(self.shared.root.clone())
    }

    pub fn handle(&self) -> StreamHandle {
        StreamHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [StreamHandle::error].
    pub async fn error(&self) -> Result<()> {
        self.shared.wait().await
    }

    /// Hands the output channel over to the caller, the caller becomes responsible for marking.
    pub fn into_receiver(self) -> mpsc::Receiver<Message<K, V>> {
        self.rx
    }

    pub fn into_stream(self) -> ReceiverStream<Message<K, V>> {
        ReceiverStream::new(self.rx)
    }
}

impl<K, V> fmt::Debug for Stream<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("node", &self.node.name())
            .finish_non_exhaustive()
    }
}

/// Handle to a running stream, kept after the pipeline got terminated.
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<Shared>,
}

impl StreamHandle {
    /// Waits for the stream to end. Returns the first error as soon as any stage fails, or
    /// `Ok(())` once every stage and the committer finished cleanly. Call it only after the
    /// whole pipeline has been attached.
    pub async fn error(&self) -> Result<()> {
        self.shared.wait().await
    }

    pub fn topology(&self) -> Topology {
        Topology::new(self.shared.root.clone())
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("root", &self.shared.root.name())
            .finish_non_exhaustive()
    }
}

/// Builds a [Stream] out of a source and the options.
#[derive(Debug, Clone, Default)]
pub struct StreamBuilder {
    config: StreamConfig,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing config, e.g. [StreamConfig::from_env].
    pub fn from_config(config: StreamConfig) -> Self {
        Self { config }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// The sink flushes once more than `size` messages are buffered.
    pub fn buffer(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// The sink flushes at least this often, zero disables time based flushes.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn flush_on_close(mut self, flush: bool) -> Self {
        self.config.flush_on_close = flush;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn monitor(mut self, monitor: Monitor) -> Self {
        self.config.monitor = Some(monitor);
        self
    }

    pub fn build<K, V, S>(self, source: S) -> Result<Stream<K, V>>
    where
        K: Payload,
        V: Payload,
        S: Source<K, V> + Send + Sync + 'static,
    {
        Stream::with_config(source, self.config)
    }
}

#[cfg(test)]
mod test_utils;
