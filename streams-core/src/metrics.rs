//! Prometheus metrics of a stream.
//!
//! Nothing is global: a [Registry] is created by the caller, [Metrics] register themselves into
//! it and a [Monitor] handed to the stream writes into them. The stream's sink stage keeps
//! [NodeMetrics] for its node and gathers them into the monitor after every flush.
//!
//! Exported series, labeled by the node name:
//! - `streams_latency` (gauge) - seconds between reading a message from the source and
//!   committing it.
//! - `streams_count_total` (counter) - messages committed.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error};

use crate::Result;

const NODE_LABEL: &str = "streams_node";

// suffixes are added by the client library depending on the metric type
const LATENCY: &str = "streams_latency";
const COUNT: &str = "streams_count";

/// Registry of metrics, encoded in the OpenMetrics text format.
#[derive(Default)]
pub struct Registry {
    // registration happens only once per metric, a sync mutex is fine
    registry: parking_lot::Mutex<prometheus_client::registry::Registry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes every registered metric.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry.lock())?;
        Ok(buffer)
    }
}

/// Metric families of the streams. Each family is keyed by the node name, so that distinct
/// streams sharing a name aggregate into one series.
#[derive(Clone)]
pub struct Metrics {
    latency: Family<Vec<(String, String)>, Gauge<f64, AtomicU64>>,
    count: Family<Vec<(String, String)>, Counter>,
}

impl Metrics {
    /// Creates the families and registers them into the given registry.
    pub fn new(registry: &Registry) -> Self {
        let metrics = Self {
            latency: Family::<Vec<(String, String)>, Gauge<f64, AtomicU64>>::default(),
            count: Family::<Vec<(String, String)>, Counter>::default(),
        };

        let mut registry = registry.registry.lock();
        registry.register(
            LATENCY,
            "Time between sourcing and sinking a message",
            metrics.latency.clone(),
        );
        registry.register(
            COUNT,
            "Number of messages processed",
            metrics.count.clone(),
        );
        metrics
    }

    fn labels(node: &str) -> Vec<(String, String)> {
        vec![(NODE_LABEL.to_string(), node.to_string())]
    }

    fn set_latency(&self, node: &str, seconds: f64) {
        self.latency.get_or_create(&Self::labels(node)).set(seconds);
    }

    fn add_count(&self, node: &str, count: u64) {
        self.count.get_or_create(&Self::labels(node)).inc_by(count);
    }

    fn write(&self, metric: Metric) {
        match metric {
            Metric::Latency { node, seconds } => self.set_latency(&node, seconds),
            Metric::Count { node, count } => self.add_count(&node, count),
        }
    }
}

/// A single observation produced by a [Collector].
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Latency { node: String, seconds: f64 },
    Count { node: String, count: u64 },
}

/// Collector emits its current observations on the given channel.
pub trait Collector: Send + Sync {
    fn collect(&self, tx: &mpsc::UnboundedSender<Metric>);
}

/// Monitor gathers observations from collectors into [Metrics]. Only one gather runs at a time.
#[derive(Clone)]
pub struct Monitor {
    metrics: Arc<Metrics>,
    lock: Arc<Mutex<()>>,
}

impl Monitor {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics: Arc::new(metrics),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Drains the observations of the collector into the metrics and returns once all of them
    /// are written.
    pub async fn gather(&self, collector: &dyn Collector) {
        let _guard = self.lock.lock().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let metrics = Arc::clone(&self.metrics);
        let drain = tokio::spawn(async move {
            while let Some(metric) = rx.recv().await {
                metrics.write(metric);
            }
        });

        collector.collect(&tx);
        drop(tx);

        if let Err(e) = drain.await {
            error!(?e, "Metrics drain task failed");
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor").finish_non_exhaustive()
    }
}

/// Observations of a single node since the last gather.
#[derive(Debug)]
pub struct NodeMetrics {
    node: String,
    state: parking_lot::Mutex<NodeState>,
}

#[derive(Debug, Default)]
struct NodeState {
    latency: Option<Duration>,
    count: u64,
}

impl NodeMetrics {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            state: parking_lot::Mutex::new(NodeState::default()),
        }
    }

    /// Records a committed batch, `latency` being the oldest message's time in the stream.
    /// Untimed batches keep the latency observed since the last gather.
    pub fn observe(&self, count: usize, latency: Option<Duration>) {
        let mut state = self.state.lock();
        state.count += count as u64;
        if latency.is_some() {
            state.latency = latency;
        }
    }
}

impl Collector for NodeMetrics {
    fn collect(&self, tx: &mpsc::UnboundedSender<Metric>) {
        let mut state = self.state.lock();
        if let Some(latency) = state.latency.take() {
            let metric = Metric::Latency {
                node: self.node.clone(),
                seconds: latency.as_secs_f64(),
            };
            if tx.send(metric).is_err() {
                debug!(node = %self.node, "Metric channel is closed, dropping latency");
            }
        }
        if state.count > 0 {
            let metric = Metric::Count {
                node: self.node.clone(),
                count: state.count,
            };
            if tx.send(metric).is_err() {
                debug!(node = %self.node, "Metric channel is closed, dropping count");
            }
        }
        debug!(node = %self.node, count = state.count, "Collected node metrics");
        // both are sent once, the counter accumulates the deltas
        state.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gather_node_metrics() {
        let registry = Registry::new();
        let monitor = Monitor::new(Metrics::new(&registry));

        let node = NodeMetrics::new("orders");
        node.observe(2, Some(Duration::from_millis(500)));
        monitor.gather(&node).await;
        node.observe(3, None);
        monitor.gather(&node).await;

        let encoded = registry.encode().unwrap();
        assert!(encoded.contains(r#"streams_count_total{streams_node="orders"} 5"#));
        assert!(encoded.contains(r#"streams_latency{streams_node="orders"} 0.5"#));
    }

    #[test]
    fn test_latency_is_sent_once() {
        let node = NodeMetrics::new("orders");
        let (tx, mut rx) = mpsc::unbounded_channel();

        node.observe(2, Some(Duration::from_millis(500)));
        node.collect(&tx);
        assert!(matches!(rx.try_recv(), Ok(Metric::Latency { seconds, .. }) if seconds == 0.5));
        assert!(matches!(rx.try_recv(), Ok(Metric::Count { count: 2, .. })));

        // an untimed batch does not repeat the previous latency
        node.observe(1, None);
        node.collect(&tx);
        assert!(matches!(rx.try_recv(), Ok(Metric::Count { count: 1, .. })));
        assert!(rx.try_recv().is_err());

        // nothing left to send, a closed channel is tolerated
        drop(rx);
        node.observe(1, Some(Duration::from_millis(10)));
        node.collect(&tx);
    }

    #[tokio::test]
    async fn test_same_name_aggregates() {
        let registry = Registry::new();
        let monitor = Monitor::new(Metrics::new(&registry));

        let first = NodeMetrics::new("sink");
        let second = NodeMetrics::new("sink");
        first.observe(1, None);
        second.observe(4, None);
        monitor.gather(&first).await;
        monitor.gather(&second).await;

        let encoded = registry.encode().unwrap();
        assert!(encoded.contains(r#"streams_count_total{streams_node="sink"} 5"#));
        assert!(!encoded.contains(r#"streams_latency{"#));
    }

    struct Fixed;

    impl Collector for Fixed {
        fn collect(&self, tx: &mpsc::UnboundedSender<Metric>) {
            for i in 0..100 {
                tx.send(Metric::Count {
                    node: format!("n{}", i % 2),
                    count: 1,
                })
                .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_gather_waits_for_drain() {
        let registry = Registry::new();
        let monitor = Monitor::new(Metrics::new(&registry));
        monitor.gather(&Fixed).await;

        let encoded = registry.encode().unwrap();
        assert!(encoded.contains(r#"streams_count_total{streams_node="n0"} 50"#));
        assert!(encoded.contains(r#"streams_count_total{streams_node="n1"} 50"#));
    }
}
