//! State shared by every stage of one stream instance, plus the two tasks the stream starts on
//! construction: the source forwarder and the committer. A third task, the supervisor, is
//! spawned by the first wait and joins every stage before letting the committer finish.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::Result;
use crate::config::StreamConfig;
use crate::error::Error;
use crate::message::{MarkReceiver, Message, Payload};
use crate::source::Source;
use crate::topology::Node;

pub(crate) struct Shared {
    pub(crate) config: StreamConfig,
    pub(crate) root: Node,
    /// first error wins
    error: OnceLock<Error>,
    /// cancelled on the first failure, every stage stops reading once it fires.
    pub(crate) cancel: CancellationToken,
    /// cancelled once every stage exited, tells the committer to commit what is left and stop.
    finished: CancellationToken,
    stages: Mutex<Vec<JoinHandle<()>>>,
    committer: Mutex<Option<JoinHandle<()>>>,
    /// set once the supervisor joining the stages has been spawned.
    supervised: AtomicBool,
    /// cancelled once every stage and the committer are done.
    done: CancellationToken,
}

impl Shared {
    pub(crate) fn new(config: StreamConfig, root: Node) -> Self {
        Self {
            config,
            root,
            error: OnceLock::new(),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            stages: Mutex::new(Vec::new()),
            committer: Mutex::new(None),
            supervised: AtomicBool::new(false),
            done: CancellationToken::new(),
        }
    }

    pub(crate) fn channel<T>(&self) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
        mpsc::channel(self.config.channel_capacity)
    }

    pub(crate) fn spawn<F>(&self, stage: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.stages.lock().push(tokio::spawn(stage));
    }

    /// Publishes the error, unless another one got there first, and stops the stream.
    pub(crate) fn fail(&self, node: &str, err: Error) {
        error!(node, ?err, "Stream failed");
        if self.error.set(err).is_err() {
            debug!(node, "Stream has already failed, keeping the first error");
        }
        self.cancel.cancel();
    }

    /// Waits till the stream fails, or till every stage and the committer are done. The first
    /// call spawns the supervisor joining the stages, dropping a pending wait leaves it running.
    pub(crate) async fn wait(self: &Arc<Self>) -> Result<()> {
        if !self.supervised.swap(true, Ordering::AcqRel) {
            let shared = Arc::clone(self);
            tokio::spawn(async move {
                shared.join().await;
                shared.done.cancel();
            });
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.done.cancelled() => {}
        }

        match self.error.get() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn join(&self) {
        // stages may be attached while we wait for the earlier ones
        loop {
            let stages = mem::take(&mut *self.stages.lock());
            if stages.is_empty() {
                break;
            }
            for result in futures::future::join_all(stages).await {
                if let Err(e) = result {
                    self.fail("stage", Error::Operator(format!("stage task failed: {e}")));
                }
            }
        }

        self.finished.cancel();
        let committer = self.committer.lock().take();
        if let Some(committer) = committer {
            if let Err(e) = committer.await {
                self.fail("committer", Error::Commit(format!("committer task failed: {e}")));
            }
        }
    }

    pub(crate) fn start_committer<K, V, S>(
        self: &Arc<Self>,
        source: Arc<S>,
        marks: MarkReceiver<K, V>,
    ) where
        K: Payload,
        V: Payload,
        S: Source<K, V> + Send + Sync + 'static,
    {
        let handle = tokio::spawn(commit(Arc::clone(self), source, marks));
        *self.committer.lock() = Some(handle);
    }
}

/// Receives the next message unless the stream has been cancelled.
pub(crate) async fn recv<T>(
    cancel: &CancellationToken,
    input: &mut mpsc::Receiver<T>,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        msg = input.recv() => msg,
    }
}

/// Closes the input and drains whatever is still queued, upstream senders observe the closure.
pub(crate) async fn close<T>(mut input: mpsc::Receiver<T>) {
    input.close();
    while input.recv().await.is_some() {}
}

/// Forwards the messages of the source into the root channel of the stream.
pub(crate) async fn forward<K, V, S>(
    shared: Arc<Shared>,
    source: Arc<S>,
    mut input: mpsc::Receiver<Message<K, V>>,
    output: mpsc::Sender<Message<K, V>>,
) where
    K: Payload,
    V: Payload,
    S: Source<K, V> + Send + Sync + 'static,
{
    let node = shared.root.name().to_string();
    let timed = shared.config.monitor.is_some();
    debug!(node = %node, "Starting source forwarder");

    while let Some(mut msg) = recv(&shared.cancel, &mut input).await {
        debug!(
            node = %node,
            topic = msg.topic(),
            partition = msg.partition(),
            offset = msg.offset(),
            "Received message"
        );
        if timed {
            msg.start_timer();
        }
        if output.send(msg).await.is_err() {
            debug!(node = %node, "Root stage closed, stopping source forwarder");
            return;
        }
    }

    if shared.cancel.is_cancelled() {
        return;
    }
    if let Some(err) = source.error() {
        shared.fail(&node, err);
        return;
    }
    debug!(node = %node, "Source exhausted");
}

/// Commits the marked messages back to the source. Every wake up commits all the marks that are
/// queued at that moment as one batch.
async fn commit<K, V, S>(shared: Arc<Shared>, source: Arc<S>, mut marks: MarkReceiver<K, V>)
where
    K: Payload,
    V: Payload,
    S: Source<K, V> + Send + Sync + 'static,
{
    let node = shared.root.name().to_string();
    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                debug!(node = %node, "Stream cancelled, stopping committer");
                return;
            }
            mark = marks.recv() => {
                let Some(first) = mark else {
                    return;
                };
                let mut batch = vec![first];
                while let Ok(msg) = marks.try_recv() {
                    batch.push(msg);
                }
                debug!(node = %node, count = batch.len(), "Committing messages");
                if let Err(err) = source.commit(batch).await {
                    shared.fail(&node, err);
                    return;
                }
            }
            _ = shared.finished.cancelled() => {
                let mut batch = Vec::new();
                while let Ok(msg) = marks.try_recv() {
                    batch.push(msg);
                }
                if !batch.is_empty() {
                    debug!(node = %node, count = batch.len(), "Committing remaining messages");
                    if let Err(err) = source.commit(batch).await {
                        shared.fail(&node, err);
                    }
                }
                return;
            }
        }
    }
}
