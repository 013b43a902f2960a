//! In-memory [Source] fed from a vector or a channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use streams_core::message::{Marker, Message, Payload};
use streams_core::source::Source;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SimpleAdapterError;
use crate::error_injector::ErrorInjector;

/// Who acknowledges the messages read from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// The stream commits marked messages back to the source.
    #[default]
    Manual,
    /// The source considers a message committed as soon as it hands it out.
    Auto,
}

enum Input<K, V> {
    Items(Vec<(K, V)>),
    Channel(mpsc::Receiver<(K, V)>),
}

struct State<K, V> {
    topic: String,
    partition: i32,
    input: Mutex<Option<Input<K, V>>>,
    committed: Mutex<Vec<i64>>,
    commit_calls: AtomicUsize,
    error: Mutex<Option<streams_core::Error>>,
    injector: ErrorInjector,
}

/// Source handing out `(key, value)` pairs with sequential offsets starting at 0. Clones share
/// the state, keep one to inspect what was committed.
pub struct SimpleSource<K, V> {
    mode: CommitMode,
    state: Arc<State<K, V>>,
}

impl<K, V> Clone for SimpleSource<K, V> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: Payload, V: Payload> SimpleSource<K, V> {
    /// Source which is exhausted after the given items.
    pub fn new(topic: &str, items: Vec<(K, V)>) -> Self {
        Self::with_input(topic, Input::Items(items))
    }

    /// Source fed through the returned sender, exhausted once every sender is dropped.
    pub fn channel(topic: &str, capacity: usize) -> (mpsc::Sender<(K, V)>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::with_input(topic, Input::Channel(rx)))
    }

    fn with_input(topic: &str, input: Input<K, V>) -> Self {
        Self {
            mode: CommitMode::Manual,
            state: Arc::new(State {
                topic: topic.to_string(),
                partition: 0,
                input: Mutex::new(Some(input)),
                committed: Mutex::new(Vec::new()),
                commit_calls: AtomicUsize::new(0),
                error: Mutex::new(None),
                injector: ErrorInjector::new(),
            }),
        }
    }

    /// Switches the source to [CommitMode::Auto].
    pub fn auto_commit(mut self) -> Self {
        self.mode = CommitMode::Auto;
        self
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.mode
    }

    /// Terminal error reported once the items are exhausted.
    pub fn fail_with(&self, err: impl Into<streams_core::Error>) {
        *self.state.error.lock() = Some(err.into());
    }

    /// Committed offsets, in commit order.
    pub fn committed(&self) -> Vec<i64> {
        self.state.committed.lock().clone()
    }

    /// Number of commit calls, successful or not.
    pub fn commit_calls(&self) -> usize {
        self.state.commit_calls.load(Ordering::Relaxed)
    }

    pub fn error_injector(&self) -> &ErrorInjector {
        &self.state.injector
    }
}

impl<K: Payload, V: Payload> Source<K, V> for SimpleSource<K, V> {
    fn messages(&self, marker: Marker<K, V>) -> mpsc::Receiver<Message<K, V>> {
        let (tx, rx) = mpsc::channel(1);
        let Some(input) = self.state.input.lock().take() else {
            warn!(topic = %self.state.topic, "Simple source has already been consumed");
            return rx;
        };

        let marker = match self.mode {
            CommitMode::Manual => Some(marker),
            CommitMode::Auto => None,
        };
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut emitter = Emitter {
                state,
                marker,
                tx,
                offset: 0,
            };
            match input {
                Input::Items(items) => {
                    for (key, value) in items {
                        if !emitter.emit(key, value).await {
                            break;
                        }
                    }
                }
                Input::Channel(mut rx) => {
                    while let Some((key, value)) = rx.recv().await {
                        if !emitter.emit(key, value).await {
                            break;
                        }
                    }
                }
            }
            debug!(
                topic = %emitter.state.topic,
                read = emitter.offset,
                "Simple source exhausted"
            );
        });
        rx
    }

    async fn commit(&self, messages: Vec<Message<K, V>>) -> streams_core::Result<()> {
        self.state.commit_calls.fetch_add(1, Ordering::Relaxed);
        self.state.injector.apply_commit_latency().await;
        if self.state.injector.should_fail_commit() {
            return Err(SimpleAdapterError::Commit(format!(
                "injected failure committing {} messages",
                messages.len()
            ))
            .into());
        }
        self.state
            .committed
            .lock()
            .extend(messages.iter().map(Message::offset));
        Ok(())
    }

    fn error(&self) -> Option<streams_core::Error> {
        self.state.error.lock().clone()
    }
}

struct Emitter<K, V> {
    state: Arc<State<K, V>>,
    marker: Option<Marker<K, V>>,
    tx: mpsc::Sender<Message<K, V>>,
    offset: i64,
}

impl<K: Payload, V: Payload> Emitter<K, V> {
    /// Returns false once the stream stopped reading.
    async fn emit(&mut self, key: K, value: V) -> bool {
        let msg = Message::new(
            key,
            value,
            self.offset,
            self.state.partition,
            self.state.topic.as_str(),
            self.marker.clone(),
        );
        if self.tx.send(msg).await.is_err() {
            return false;
        }
        if self.marker.is_none() {
            self.state.committed.lock().push(self.offset);
        }
        self.offset += 1;
        true
    }
}
