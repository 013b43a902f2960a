//! Doubles shared by the stream tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::Result;
use crate::error::Error;
use crate::message::{Marker, Message};
use crate::sink::Sink;
use crate::source::Source;

type Pair = (String, String);

/// Manual commit source, records the offsets it was asked to commit.
pub(crate) struct TestSource {
    input: Mutex<Option<mpsc::Receiver<Pair>>>,
    commits: Arc<Mutex<Vec<i64>>>,
    error: Option<Error>,
    commit_error: Option<Error>,
}

impl TestSource {
    pub(crate) fn new(items: &[(&str, &str)]) -> Self {
        Self::from_pairs(
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub(crate) fn from_pairs(items: Vec<Pair>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.try_send(item).unwrap();
        }
        Self::from_receiver(rx)
    }

    /// Source fed through the returned sender, it is exhausted once the sender is dropped.
    pub(crate) fn channel() -> (mpsc::Sender<Pair>, Self) {
        let (tx, rx) = mpsc::channel(16);
        (tx, Self::from_receiver(rx))
    }

    fn from_receiver(rx: mpsc::Receiver<Pair>) -> Self {
        Self {
            input: Mutex::new(Some(rx)),
            commits: Arc::new(Mutex::new(Vec::new())),
            error: None,
            commit_error: None,
        }
    }

    pub(crate) fn with_error(mut self, err: Error) -> Self {
        self.error = Some(err);
        self
    }

    pub(crate) fn with_commit_error(mut self, err: Error) -> Self {
        self.commit_error = Some(err);
        self
    }

    pub(crate) fn commits(&self) -> Arc<Mutex<Vec<i64>>> {
        Arc::clone(&self.commits)
    }
}

impl Source<String, String> for TestSource {
    fn messages(&self, marker: Marker<String, String>) -> mpsc::Receiver<Message<String, String>> {
        let (tx, rx) = mpsc::channel(1);
        let Some(mut input) = self.input.lock().take() else {
            return rx;
        };
        tokio::spawn(async move {
            let mut offset = 0;
            while let Some((key, value)) = input.recv().await {
                let msg = Message::new(key, value, offset, 0, "test", Some(marker.clone()));
                if tx.send(msg).await.is_err() {
                    break;
                }
                offset += 1;
            }
        });
        rx
    }

    async fn commit(&self, messages: Vec<Message<String, String>>) -> Result<()> {
        if let Some(err) = &self.commit_error {
            return Err(err.clone());
        }
        self.commits
            .lock()
            .extend(messages.iter().map(Message::offset));
        Ok(())
    }

    fn error(&self) -> Option<Error> {
        self.error.clone()
    }
}

/// Records the keys of every write call.
pub(crate) struct TestSink {
    writes: Arc<Mutex<Vec<Vec<String>>>>,
    error: Option<Error>,
}

impl TestSink {
    pub(crate) fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            error: None,
        }
    }

    pub(crate) fn failing(err: Error) -> Self {
        Self {
            error: Some(err),
            ..Self::new()
        }
    }

    pub(crate) fn writes(&self) -> Arc<Mutex<Vec<Vec<String>>>> {
        Arc::clone(&self.writes)
    }
}

impl Sink<String, String> for TestSink {
    async fn write(&mut self, messages: &[Message<String, String>]) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        self.writes
            .lock()
            .push(messages.iter().map(|m| m.key().clone()).collect());
        Ok(())
    }
}

/// Reads the receiver till it closes.
pub(crate) async fn collect<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Some(item) = rx.recv().await {
        out.push(item);
    }
    out
}
