//! A Source produces an unbounded sequence of [Message]s, accepts batched commits of processed
//! messages, and reports a terminal error once its message queue closes.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::Result;
use crate::error::Error;
use crate::message::{Marker, Message, Payload};

/// [reader] source emits the lines of an [AsyncRead](tokio::io::AsyncRead).
mod reader;
pub use reader::ReaderSource;

/// Set of items to be implemented to become a Source.
#[trait_variant::make(Source: Send)]
#[allow(dead_code)]
pub trait LocalSource<K: Payload, V: Payload>: Sync {
    /// Returns the queue of messages read from the outside world. Sources which want the
    /// stream to commit for them attach `marker` to every message they create.
    fn messages(&self, marker: Marker<K, V>) -> mpsc::Receiver<Message<K, V>>;

    /// Commit the progress of the given messages.
    async fn commit(&self, messages: Vec<Message<K, V>>) -> Result<()>;

    /// Terminal error of the source, consulted after the message queue closes.
    fn error(&self) -> Option<Error>;
}

/// ChannelSource turns a channel of `(key, value)` pairs into a [Source]. Offsets are assigned
/// sequentially and nothing is ever committed.
pub struct ChannelSource<K, V> {
    topic: String,
    capacity: usize,
    input: Mutex<Option<mpsc::Receiver<(K, V)>>>,
}

impl<K: Payload, V: Payload> ChannelSource<K, V> {
    pub fn new(topic: impl Into<String>, input: mpsc::Receiver<(K, V)>) -> Self {
        Self {
            topic: topic.into(),
            capacity: 1,
            input: Mutex::new(Some(input)),
        }
    }
}

impl<K: Payload, V: Payload> Source<K, V> for ChannelSource<K, V> {
    fn messages(&self, _marker: Marker<K, V>) -> mpsc::Receiver<Message<K, V>> {
        let (tx, rx) = mpsc::channel(self.capacity);

        let Some(mut input) = self.input.lock().take() else {
            warn!(topic = %self.topic, "Channel source has already been consumed");
            return rx;
        };

        let topic = self.topic.clone();
        tokio::spawn(async move {
            let mut offset = 0;
            while let Some((key, value)) = input.recv().await {
                let msg = Message::new(key, value, offset, 0, topic.as_str(), None);
                if tx.send(msg).await.is_err() {
                    break;
                }
                offset += 1;
            }
        });

        rx
    }

    async fn commit(&self, _messages: Vec<Message<K, V>>) -> Result<()> {
        Ok(())
    }

    fn error(&self) -> Option<Error> {
        None
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::{ChannelSource, Source};
    use crate::message::Marker;

    #[tokio::test]
    async fn test_channel_source() {
        let (tx, rx) = mpsc::channel(10);
        let source = ChannelSource::new("numbers", rx);
        let (marker, _marks) = Marker::channel();

        tx.send(("a".to_string(), 1)).await.unwrap();
        tx.send(("b".to_string(), 2)).await.unwrap();
        drop(tx);

        let mut messages = source.messages(marker);
        let first = messages.recv().await.unwrap();
        assert_eq!(first.key(), "a");
        assert_eq!(*first.value(), 1);
        assert_eq!(first.offset(), 0);
        assert_eq!(first.topic(), "numbers");

        let second = messages.recv().await.unwrap();
        assert_eq!(second.offset(), 1);
        assert!(messages.recv().await.is_none());

        assert!(source.commit(vec![first, second]).await.is_ok());
        assert!(source.error().is_none());
    }

    #[tokio::test]
    async fn test_channel_source_consumed_once() {
        let (_tx, rx) = mpsc::channel::<(String, String)>(1);
        let source = ChannelSource::new("t", rx);
        let (marker, _marks) = Marker::channel();

        let _first = source.messages(marker.clone());
        let mut second = source.messages(marker);
        assert!(second.recv().await.is_none());
    }
}
