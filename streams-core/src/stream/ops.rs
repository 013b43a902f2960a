use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::engine::{self, Shared};
use super::{Predicate, Stream, Transform};
use crate::Result;
use crate::message::{Message, Payload};

impl<K: Payload, V: Payload> Stream<K, V> {
    /// Forwards the messages the predicate accepts. Rejected messages are marked and dropped so
    /// that their offsets still get committed. A predicate error fails the stream.
    pub fn filter<P>(self, name: &str, mut pred: P) -> Stream<K, V>
    where
        P: Predicate<K, V>,
    {
        self.stage(name, move |msg| {
            if pred.test(&msg)? {
                Ok(Some(msg))
            } else {
                msg.mark();
                Ok(None)
            }
        })
    }

    /// Replaces every message with the output of the transform. A transform error fails the
    /// stream.
    pub fn map<T>(self, name: &str, mut transform: T) -> Stream<K, V>
    where
        T: Transform<K, V>,
    {
        self.stage(name, move |msg| transform.apply(msg).map(Some))
    }

    /// Calls `f` on every message and forwards it unchanged.
    pub fn inspect<F>(self, name: &str, mut f: F) -> Stream<K, V>
    where
        F: FnMut(&Message<K, V>) + Send + 'static,
    {
        self.stage(name, move |msg| {
            f(&msg);
            Ok(Some(msg))
        })
    }

    /// Emits one `info` record per message and forwards it unchanged.
    pub fn log(self, name: &str) -> Stream<K, V> {
        let node = name.to_string();
        self.stage(name, move |msg| {
            info!(
                node = %node,
                key = ?msg.key(),
                value = ?msg.value(),
                topic = msg.topic(),
                partition = msg.partition(),
                offset = msg.offset(),
                "Message"
            );
            Ok(Some(msg))
        })
    }

    /// Marks every message and forwards it. Used to acknowledge messages which are not written
    /// anywhere, usually followed by [Stream::drain].
    pub fn mark(self, name: &str) -> Stream<K, V> {
        self.stage(name, |msg| {
            msg.mark();
            Ok(Some(msg))
        })
    }

    /// Spawns a stage applying `step` to every message, `None` drops the message.
    fn stage<F>(self, name: &str, step: F) -> Stream<K, V>
    where
        F: FnMut(Message<K, V>) -> Result<Option<Message<K, V>>> + Send + 'static,
    {
        let node = self.attach(name);
        let (tx, rx) = self.shared.channel();
        let stream = self.derive(node.clone(), rx);

        self.shared.spawn(run(
            Arc::clone(&self.shared),
            node.name().to_string(),
            self.rx,
            tx,
            step,
        ));
        stream
    }
}

async fn run<K, V, F>(
    shared: Arc<Shared>,
    node: String,
    mut input: mpsc::Receiver<Message<K, V>>,
    output: mpsc::Sender<Message<K, V>>,
    mut step: F,
) where
    K: Payload,
    V: Payload,
    F: FnMut(Message<K, V>) -> Result<Option<Message<K, V>>> + Send + 'static,
{
    debug!(node = %node, "Starting stage");
    while let Some(msg) = engine::recv(&shared.cancel, &mut input).await {
        match step(msg) {
            Ok(Some(msg)) => {
                if output.send(msg).await.is_err() {
                    debug!(node = %node, "Downstream closed, stopping stage");
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => {
                shared.fail(&node, err);
                break;
            }
        }
    }
    drop(output);
    engine::close(input).await;
    debug!(node = %node, "Stopped stage");
}
