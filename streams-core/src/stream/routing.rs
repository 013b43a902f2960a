use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::engine::{self, Shared};
use super::{Predicate, Stream};
use crate::Result;
use crate::error::Error;
use crate::message::{Message, Payload};
use crate::topology::Node;

impl<K: Payload, V: Payload> Stream<K, V> {
    /// Splits the stream, one child per predicate. Every message goes to the child of the first
    /// predicate accepting it. Messages no predicate accepts are marked and dropped. A predicate
    /// error fails the stream.
    pub fn branch(self, name: &str, preds: Vec<Box<dyn Predicate<K, V>>>) -> Vec<Stream<K, V>> {
        let node = self.attach(name);
        let (outputs, streams) = self.children(&node, preds.len());

        self.shared.spawn(branch(
            Arc::clone(&self.shared),
            node.name().to_string(),
            self.rx,
            preds,
            outputs,
        ));
        streams
    }

    /// Delivers every message to all the `n` children, in child order. The children but the last
    /// one get a [fork](Message::fork) of the message, so every child marks its copy on its own.
    /// With no children every message is marked and dropped.
    pub fn fan_out(self, name: &str, n: usize) -> Vec<Stream<K, V>> {
        let node = self.attach(name);
        let (outputs, streams) = self.children(&node, n);

        self.shared.spawn(fan_out(
            Arc::clone(&self.shared),
            node.name().to_string(),
            self.rx,
            outputs,
        ));
        streams
    }

    /// Merges the streams into one. The merged stream closes only after every upstream closed,
    /// order is kept per upstream but not across them. All streams must come from the same
    /// source, and there must be at least one.
    pub fn merge(name: &str, streams: Vec<Stream<K, V>>) -> Result<Stream<K, V>> {
        let Some(first) = streams.first() else {
            return Err(Error::Topology(format!(
                "merge {name} needs at least one stream"
            )));
        };
        if streams
            .iter()
            .any(|s| !Arc::ptr_eq(&s.shared, &first.shared))
        {
            return Err(Error::Topology(format!(
                "merge {name} spans streams of different sources"
            )));
        }

        let node = Node::new(name);
        for stream in &streams {
            stream.node.add_child(node.clone());
        }

        let (tx, rx) = first.shared.channel();
        let merged = first.derive(node, rx);
        for stream in streams {
            stream.shared.spawn(forward(
                Arc::clone(&stream.shared),
                name.to_string(),
                stream.rx,
                tx.clone(),
            ));
        }
        Ok(merged)
    }

    fn children(
        &self,
        node: &Node,
        n: usize,
    ) -> (Vec<mpsc::Sender<Message<K, V>>>, Vec<Stream<K, V>>) {
        (0..n)
            .map(|_| {
                let (tx, rx) = self.shared.channel();
                (tx, self.derive(node.clone(), rx))
            })
            .unzip()
    }
}

async fn branch<K: Payload, V: Payload>(
    shared: Arc<Shared>,
    node: String,
    mut input: mpsc::Receiver<Message<K, V>>,
    mut preds: Vec<Box<dyn Predicate<K, V>>>,
    outputs: Vec<mpsc::Sender<Message<K, V>>>,
) {
    debug!(node = %node, children = outputs.len(), "Starting branch");
    'messages: while let Some(msg) = engine::recv(&shared.cancel, &mut input).await {
        for (pred, output) in preds.iter_mut().zip(&outputs) {
            match pred.test(&msg) {
                Ok(true) => {
                    if output.send(msg).await.is_err() {
                        debug!(node = %node, "Branch closed, stopping branch");
                        break 'messages;
                    }
                    continue 'messages;
                }
                Ok(false) => {}
                Err(err) => {
                    shared.fail(&node, err);
                    break 'messages;
                }
            }
        }
        // nobody wants it
        msg.mark();
    }
    drop(outputs);
    engine::close(input).await;
    debug!(node = %node, "Stopped branch");
}

async fn fan_out<K: Payload, V: Payload>(
    shared: Arc<Shared>,
    node: String,
    mut input: mpsc::Receiver<Message<K, V>>,
    outputs: Vec<mpsc::Sender<Message<K, V>>>,
) {
    debug!(node = %node, children = outputs.len(), "Starting fan-out");
    'messages: while let Some(msg) = engine::recv(&shared.cancel, &mut input).await {
        let Some((last, rest)) = outputs.split_last() else {
            msg.mark();
            continue;
        };
        for output in rest {
            if output.send(msg.fork()).await.is_err() {
                debug!(node = %node, "Child closed, stopping fan-out");
                break 'messages;
            }
        }
        if last.send(msg).await.is_err() {
            debug!(node = %node, "Child closed, stopping fan-out");
            break;
        }
    }
    drop(outputs);
    engine::close(input).await;
    debug!(node = %node, "Stopped fan-out");
}

async fn forward<K: Payload, V: Payload>(
    shared: Arc<Shared>,
    node: String,
    mut input: mpsc::Receiver<Message<K, V>>,
    output: mpsc::Sender<Message<K, V>>,
) {
    while let Some(msg) = engine::recv(&shared.cancel, &mut input).await {
        if output.send(msg).await.is_err() {
            debug!(node = %node, "Merged stream closed, stopping merge");
            break;
        }
    }
    drop(output);
    engine::close(input).await;
}
