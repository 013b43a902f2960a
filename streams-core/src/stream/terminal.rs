use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::debug;

use super::engine::{self, Shared};
use super::{Stream, StreamHandle};
use crate::Result;
use crate::message::{Message, Payload};
use crate::metrics::NodeMetrics;
use crate::sink::Sink;

impl<K: Payload, V: Payload> Stream<K, V> {
    /// Terminates the stream into the sink. Messages are buffered and written in batches, a
    /// batch is written once more than `buffer_size` messages are buffered or when the
    /// `timeout` elapses, whichever comes first. Written messages are marked, hence committed.
    pub fn sink<S>(self, name: &str, sink: S) -> StreamHandle
    where
        S: Sink<K, V> + Send + 'static,
    {
        let node = self.attach(name);
        let handle = self.handle();

        let writer = SinkWriter {
            node: node.name().to_string(),
            shared: Arc::clone(&self.shared),
            sink,
            buffer: Vec::new(),
            metrics: NodeMetrics::new(node.name()),
        };
        self.shared.spawn(writer.run(self.rx));
        handle
    }

    /// Terminates the stream discarding every message, usually after [Stream::mark].
    pub fn drain(self, name: &str) -> StreamHandle {
        let node = self.attach(name);
        let handle = self.handle();

        let shared = Arc::clone(&self.shared);
        let mut input = self.rx;
        self.shared.spawn(async move {
            while engine::recv(&shared.cancel, &mut input).await.is_some() {}
            engine::close(input).await;
            debug!(node = node.name(), "Drained stream");
        });
        handle
    }
}

/// Buffers messages and flushes them into the sink.
struct SinkWriter<K, V, S> {
    node: String,
    shared: Arc<Shared>,
    sink: S,
    buffer: Vec<Message<K, V>>,
    metrics: NodeMetrics,
}

impl<K, V, S> SinkWriter<K, V, S>
where
    K: Payload,
    V: Payload,
    S: Sink<K, V> + Send + 'static,
{
    async fn run(mut self, mut input: mpsc::Receiver<Message<K, V>>) {
        let buffer_size = self.shared.config.buffer_size;
        let mut ticker = ticker(self.shared.config.timeout);
        debug!(
            node = %self.node,
            buffer_size,
            timeout = ?self.shared.config.timeout,
            "Starting sink"
        );

        loop {
            tokio::select! {
                biased;
                _ = tick(&mut ticker) => {
                    if let Err(err) = self.flush(&mut ticker).await {
                        self.shared.fail(&self.node, err);
                        break;
                    }
                }
                msg = engine::recv(&self.shared.cancel, &mut input) => {
                    let Some(msg) = msg else {
                        self.close().await;
                        break;
                    };
                    self.buffer.push(msg);
                    if self.buffer.len() > buffer_size {
                        if let Err(err) = self.flush(&mut ticker).await {
                            self.shared.fail(&self.node, err);
                            break;
                        }
                    }
                }
            }
        }

        engine::close(input).await;
        debug!(node = %self.node, "Stopped sink");
    }

    /// Input is exhausted, what is left in the buffer gets written only if the stream did not
    /// fail and flushing on close is enabled. Otherwise it stays unmarked.
    async fn close(&mut self) {
        if self.shared.cancel.is_cancelled() || !self.shared.config.flush_on_close {
            debug!(
                node = %self.node,
                dropped = self.buffer.len(),
                "Dropping unflushed messages"
            );
            self.buffer.clear();
            return;
        }
        let mut ticker = None;
        if let Err(err) = self.flush(&mut ticker).await {
            self.shared.fail(&self.node, err);
        }
    }

    /// Writes the buffer and marks the written messages, then restarts the timer at its full
    /// interval.
    async fn flush(&mut self, ticker: &mut Option<Interval>) -> Result<()> {
        if !self.buffer.is_empty() {
            self.write().await?;
        }
        if let Some(ticker) = ticker {
            ticker.reset();
        }
        Ok(())
    }

    async fn write(&mut self) -> Result<()> {
        self.sink.write(&self.buffer).await?;

        let count = self.buffer.len();
        let latency = self.buffer.iter().filter_map(Message::elapsed).max();
        for msg in self.buffer.drain(..) {
            msg.mark();
        }
        debug!(node = %self.node, count, "Flushed messages");

        if let Some(monitor) = &self.shared.config.monitor {
            self.metrics.observe(count, latency);
            monitor.gather(&self.metrics).await;
        }
        Ok(())
    }
}

/// A zero timeout disables the time trigger.
fn ticker(timeout: Duration) -> Option<Interval> {
    if timeout.is_zero() {
        return None;
    }
    let mut ticker = time::interval_at(time::Instant::now() + timeout, timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::StreamConfig;
    use crate::error::Error;
    use crate::metrics::{Metrics, Monitor, Registry};
    use crate::stream::test_utils::{TestSink, TestSource};

    fn config(buffer_size: usize, timeout: Duration) -> StreamConfig {
        StreamConfig {
            buffer_size,
            timeout,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sink_writes_one_by_one() {
        let source = TestSource::new(&[("test", "test"), ("test2", "test")]);
        let commits = source.commits();
        let sink = TestSink::new();
        let writes = sink.writes();

        let stream = Stream::with_config(source, config(0, Duration::ZERO)).unwrap();
        let handle = stream.sink("sink", sink);

        assert_eq!(handle.error().await, Ok(()));
        assert_eq!(
            *writes.lock(),
            vec![vec!["test".to_string()], vec!["test2".to_string()]]
        );
        let mut committed = commits.lock().clone();
        committed.sort();
        assert_eq!(committed, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_size_trigger() {
        let items: Vec<_> = (0..7).map(|i| (format!("k{i}"), "v".to_string())).collect();
        let source = TestSource::from_pairs(items);
        let sink = TestSink::new();
        let writes = sink.writes();

        let stream = Stream::with_config(source, config(2, Duration::ZERO)).unwrap();
        let handle = stream.sink("sink", sink);

        assert_eq!(handle.error().await, Ok(()));
        let sizes: Vec<_> = writes.lock().iter().map(Vec::len).collect();
        // flushed once more than 2 are buffered, the leftover is flushed on close
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_no_flush_on_close() {
        let source = TestSource::new(&[("a", "1"), ("b", "2")]);
        let commits = source.commits();
        let sink = TestSink::new();
        let writes = sink.writes();

        let config = StreamConfig {
            flush_on_close: false,
            ..config(10, Duration::ZERO)
        };
        let stream = Stream::with_config(source, config).unwrap();
        let handle = stream.sink("sink", sink);

        assert_eq!(handle.error().await, Ok(()));
        assert!(writes.lock().is_empty());
        assert!(commits.lock().is_empty());
    }

    #[tokio::test]
    async fn test_time_trigger() {
        let (tx, source) = TestSource::channel();
        let commits = source.commits();
        let sink = TestSink::new();
        let writes = sink.writes();

        let stream = Stream::with_config(source, config(100, Duration::from_millis(200))).unwrap();
        let handle = stream.sink("sink", sink);

        tx.send(("a".to_string(), "1".to_string())).await.unwrap();
        tx.send(("b".to_string(), "2".to_string())).await.unwrap();
        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(
            *writes.lock(),
            vec![vec!["a".to_string(), "b".to_string()]]
        );

        tx.send(("c".to_string(), "3".to_string())).await.unwrap();
        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(writes.lock().len(), 2);

        drop(tx);
        assert_eq!(handle.error().await, Ok(()));
        assert_eq!(commits.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_write_error_leaves_messages_unmarked() {
        let source = TestSource::new(&[("a", "1"), ("b", "2")]);
        let commits = source.commits();
        let sink = TestSink::failing(Error::Sink("disk full".to_string()));

        let stream = Stream::with_config(source, config(0, Duration::ZERO)).unwrap();
        let handle = stream.sink("sink", sink);

        assert_eq!(
            handle.error().await,
            Err(Error::Sink("disk full".to_string()))
        );
        assert!(commits.lock().is_empty());
    }

    #[tokio::test]
    async fn test_commit_error_fails_stream() {
        let source = TestSource::new(&[("a", "1")])
            .with_commit_error(Error::Commit("broker down".to_string()));
        let sink = TestSink::new();

        let stream = Stream::with_config(source, config(0, Duration::ZERO)).unwrap();
        let handle = stream.sink("sink", sink);

        assert_eq!(
            handle.error().await,
            Err(Error::Commit("broker down".to_string()))
        );
    }

    #[tokio::test]
    async fn test_source_error_fails_stream() {
        let source = TestSource::new(&[("a", "1")])
            .with_error(Error::Source("connection reset".to_string()));
        let sink = TestSink::new();

        let stream = Stream::new(source);
        let handle = stream.sink("sink", sink);

        assert_eq!(
            handle.error().await,
            Err(Error::Source("connection reset".to_string()))
        );
    }

    #[tokio::test]
    async fn test_drain_after_mark() {
        let source = TestSource::new(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let commits = source.commits();

        let handle = Stream::new(source).mark("mark").drain("drain");
        assert_eq!(handle.error().await, Ok(()));
        assert_eq!(commits.lock().len(), 3);
        assert_eq!(handle.topology().names(), vec!["root", "mark", "drain"]);
    }

    #[tokio::test]
    async fn test_sink_exports_metrics() {
        let registry = Registry::new();
        let monitor = Monitor::new(Metrics::new(&registry));

        let source = TestSource::new(&[("a", "1"), ("b", "2")]);
        let stream = Stream::<String, String>::builder()
            .name("orders")
            .buffer(0)
            .timeout(Duration::ZERO)
            .monitor(monitor)
            .build(source)
            .unwrap();
        let handle = stream.sink("orders-sink", TestSink::new());

        assert_eq!(handle.error().await, Ok(()));
        let encoded = registry.encode().unwrap();
        assert!(encoded.contains(r#"streams_count_total{streams_node="orders-sink"} 2"#));
        assert!(encoded.contains(r#"streams_latency{streams_node="orders-sink"}"#));
    }
}
