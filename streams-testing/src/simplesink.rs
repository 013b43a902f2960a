//! In-memory [Sink] recording every batch it is asked to write.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use streams_core::message::{Message, Payload};
use streams_core::sink::Sink;

use crate::error::SimpleAdapterError;
use crate::error_injector::ErrorInjector;

struct State<K, V> {
    writes: Mutex<Vec<Vec<(K, V)>>>,
    write_calls: AtomicUsize,
    injector: ErrorInjector,
}

/// Sink keeping the `(key, value)` pairs of every successful write. Clones share the state.
pub struct SimpleSink<K, V> {
    state: Arc<State<K, V>>,
}

impl<K, V> Clone for SimpleSink<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: Payload, V: Payload> Default for SimpleSink<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Payload, V: Payload> SimpleSink<K, V> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State {
                writes: Mutex::new(Vec::new()),
                write_calls: AtomicUsize::new(0),
                injector: ErrorInjector::new(),
            }),
        }
    }

    /// Successful writes, one entry per batch.
    pub fn writes(&self) -> Vec<Vec<(K, V)>> {
        self.state.writes.lock().clone()
    }

    /// Every written pair, in write order.
    pub fn messages(&self) -> Vec<(K, V)> {
        self.state.writes.lock().iter().flatten().cloned().collect()
    }

    /// Number of write calls, successful or not.
    pub fn write_calls(&self) -> usize {
        self.state.write_calls.load(Ordering::Relaxed)
    }

    pub fn error_injector(&self) -> &ErrorInjector {
        &self.state.injector
    }
}

impl<K: Payload, V: Payload> Sink<K, V> for SimpleSink<K, V> {
    async fn write(&mut self, messages: &[Message<K, V>]) -> streams_core::Result<()> {
        self.state.write_calls.fetch_add(1, Ordering::Relaxed);
        self.state.injector.apply_write_latency().await;
        if self.state.injector.should_fail_write() {
            return Err(SimpleAdapterError::Write(format!(
                "injected failure writing {} messages",
                messages.len()
            ))
            .into());
        }
        let batch = messages
            .iter()
            .map(|m| (m.key().clone(), m.value().clone()))
            .collect();
        self.state.writes.lock().push(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(key: &str, value: u32) -> Message<String, u32> {
        Message::new(key.to_string(), value, 0, 0, "t", None)
    }

    #[tokio::test]
    async fn test_records_batches() {
        let sink = SimpleSink::new();
        let mut writer = sink.clone();

        writer
            .write(&[message("a", 1), message("b", 2)])
            .await
            .unwrap();
        writer.write(&[message("c", 3)]).await.unwrap();

        assert_eq!(sink.writes().len(), 2);
        assert_eq!(
            sink.messages(),
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3)
            ]
        );
        assert_eq!(sink.write_calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let mut sink = SimpleSink::new();
        sink.error_injector().fail_writes(1);

        let err = sink.write(&[message("a", 1)]).await.unwrap_err();
        assert!(matches!(err, streams_core::Error::Sink(_)));
        assert!(sink.writes().is_empty());

        sink.write(&[message("a", 1)]).await.unwrap();
        assert_eq!(sink.messages(), vec![("a".to_string(), 1)]);
        assert_eq!(sink.write_calls(), 2);
    }
}
