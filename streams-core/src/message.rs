//! Message is the unit that flows from the [Source](crate::source::Source) through the stages
//! till it reaches the [Sink](crate::sink::Sink). Besides the payload it carries the coordinates
//! it was read at (topic, partition, offset) and a one-time mark latch.
//!
//! Marking is the first half of the acknowledgement protocol. The moment a message is marked for
//! the first time, a handle to it is pushed onto the [Marker] queue owned by the stream, and the
//! stream eventually commits it back to the source. Any further `mark` calls, from any task, are
//! no-ops.
//!
//! ```text
//! (source) --> (stage)* --> (sink) --write--> mark --> [marker queue] --> commit --> (source)
//! ```
//!
//! Cloning a [Message] is cheap and the copies share the latch, i.e. they are the same logical
//! message. Use [Message::fork] when one record has to be delivered to several consumers and
//! every consumer must acknowledge it on its own.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

/// Bounds required from keys and values flowing through a stream.
pub trait Payload: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Receiving half of the marker queue, consumed by the stream's committer.
pub type MarkReceiver<K, V> = mpsc::UnboundedReceiver<Message<K, V>>;

/// Sending half of the marker queue. Sources attach it to the messages they create when they
/// want the stream to commit on their behalf (manual commit). Sources that commit on their own
/// (auto commit) simply don't attach it.
pub struct Marker<K, V> {
    tx: mpsc::UnboundedSender<Message<K, V>>,
}

impl<K, V> Clone for Marker<K, V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Marker<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Marker")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<K, V> Marker<K, V> {
    /// Creates a new marker queue.
    pub fn channel() -> (Self, MarkReceiver<K, V>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, message: Message<K, V>) {
        // the committer is gone only once the stream has shut down
        if self.tx.send(message).is_err() {
            trace!("marker queue is closed, dropping mark");
        }
    }
}

/// The message that is passed from the source to the sink.
pub struct Message<K, V> {
    key: K,
    value: V,
    topic: Arc<str>,
    partition: i32,
    offset: i64,
    /// shared by all the clones of the same logical message.
    latch: Arc<AtomicBool>,
    marker: Option<Marker<K, V>>,
    /// when the stream read the message, only set when a monitor is attached.
    read_at: Option<Instant>,
}

impl<K: Payload, V: Payload> Message<K, V> {
    pub fn new(
        key: K,
        value: V,
        offset: i64,
        partition: i32,
        topic: impl Into<Arc<str>>,
        marker: Option<Marker<K, V>>,
    ) -> Self {
        Self {
            key,
            value,
            topic: topic.into(),
            partition,
            offset,
            latch: Arc::new(AtomicBool::new(false)),
            marker,
            read_at: None,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn set_key(&mut self, key: K) {
        self.key = key;
    }

    pub fn set_value(&mut self, value: V) {
        self.value = value;
    }

    /// Marks the message as completely processed. Only the first call has an effect, it pushes
    /// the message onto the marker queue if one is attached.
    pub fn mark(&self) {
        if self
            .latch
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if let Some(marker) = &self.marker {
            marker.push(self.clone());
        }
    }

    /// Returns whether the message has been marked.
    pub fn marked(&self) -> bool {
        self.latch.load(Ordering::Acquire)
    }

    /// Returns an independent copy of the message which shares the source coordinates and the
    /// marker queue, but starts with its own unmarked latch.
    pub fn fork(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            topic: Arc::clone(&self.topic),
            partition: self.partition,
            offset: self.offset,
            latch: Arc::new(AtomicBool::new(false)),
            marker: self.marker.clone(),
            read_at: self.read_at,
        }
    }

    /// Time elapsed since the stream read the message, if it is being timed.
    pub fn elapsed(&self) -> Option<Duration> {
        self.read_at.map(|t| t.elapsed())
    }

    pub(crate) fn start_timer(&mut self) {
        self.read_at = Some(Instant::now());
    }
}

impl<K: Clone, V: Clone> Clone for Message<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            topic: Arc::clone(&self.topic),
            partition: self.partition,
            offset: self.offset,
            latch: Arc::clone(&self.latch),
            marker: self.marker.clone(),
            read_at: self.read_at,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Message<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("offset", &self.offset)
            .field("marked", &self.latch.load(Ordering::Acquire))
            .finish()
    }
}
