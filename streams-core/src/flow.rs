//! Untyped building blocks. A [Flow] is a chain of tasks over plain elements instead of
//! [Message](crate::message::Message)s, without marking, committing or failing. Every stage
//! runs in its own task and closes its output once its input closes.
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use streams_core::flow::Flow;
//!
//! let out = Flow::from_iter(1..=5)
//!     .skip(1)
//!     .map(|x| x * 10)
//!     .reduce(|acc, x| acc + x)
//!     .collect()
//!     .await;
//! assert_eq!(out, vec![20, 50, 90, 140]);
//! # }
//! ```

use std::fmt::Debug;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

const DEFAULT_CAPACITY: usize = 1;

pub struct Flow<T> {
    rx: mpsc::Receiver<T>,
}

impl<T: Send + 'static> Flow<T> {
    pub fn from_receiver(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Emits the items of the iterator, must be called within a tokio runtime.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        let iter = iter.into_iter();
        tokio::spawn(async move {
            for item in iter {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }

    /// Spawns a stage which feeds every input into `step` along with the output. `step` returns
    /// false once the output is gone.
    fn stage<U, F, Fut>(self, mut step: F) -> Flow<U>
    where
        U: Send + 'static,
        F: FnMut(T, mpsc::Sender<U>) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        let mut input = self.rx;
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                if !step(item, tx.clone()).await {
                    break;
                }
            }
        });
        Flow { rx }
    }

    pub fn map<U, F>(self, mut f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        self.stage(move |item, tx| {
            let out = f(item);
            async move { tx.send(out).await.is_ok() }
        })
    }

    pub fn filter<F>(self, mut f: F) -> Flow<T>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.stage(move |item, tx| {
            let keep = f(&item).then_some(item);
            async move {
                match keep {
                    Some(item) => tx.send(item).await.is_ok(),
                    None => true,
                }
            }
        })
    }

    /// Expands every input into zero or more outputs, in order.
    pub fn flat_map<U, I, F>(self, mut f: F) -> Flow<U>
    where
        U: Send + 'static,
        I: IntoIterator<Item = U>,
        I::IntoIter: Send + 'static,
        F: FnMut(T) -> I + Send + 'static,
    {
        self.stage(move |item, tx| {
            let outputs = f(item).into_iter();
            async move {
                for out in outputs {
                    if tx.send(out).await.is_err() {
                        return false;
                    }
                }
                true
            }
        })
    }

    /// Folds the inputs, the first one seeds the accumulator. Emits the accumulator after every
    /// input.
    pub fn reduce<F>(self, mut f: F) -> Flow<T>
    where
        T: Clone,
        F: FnMut(T, T) -> T + Send + 'static,
    {
        let mut acc: Option<T> = None;
        self.stage(move |item, tx| {
            let next = match acc.take() {
                Some(prev) => f(prev, item),
                None => item,
            };
            acc = Some(next.clone());
            async move { tx.send(next).await.is_ok() }
        })
    }

    /// Drops the first `n` inputs.
    pub fn skip(self, n: usize) -> Flow<T> {
        let mut skipped = 0;
        self.stage(move |item, tx| {
            let pass = if skipped < n {
                skipped += 1;
                None
            } else {
                Some(item)
            };
            async move {
                match pass {
                    Some(item) => tx.send(item).await.is_ok(),
                    None => true,
                }
            }
        })
    }

    pub fn pass_through(self) -> Flow<T> {
        self.stage(|item, tx| async move { tx.send(item).await.is_ok() })
    }

    pub fn inspect<F>(self, mut f: F) -> Flow<T>
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.stage(move |item, tx| {
            f(&item);
            async move { tx.send(item).await.is_ok() }
        })
    }

    /// Emits one `info` record per element.
    pub fn log(self, name: &str) -> Flow<T>
    where
        T: Debug,
    {
        let name = name.to_string();
        self.inspect(move |item| info!(node = %name, ?item, "Element"))
    }

    pub fn into_receiver(self) -> mpsc::Receiver<T> {
        self.rx
    }

    pub fn into_stream(self) -> ReceiverStream<T> {
        ReceiverStream::new(self.rx)
    }

    /// Reads every element till the flow closes.
    pub async fn collect(mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = self.rx.recv().await {
            out.push(item);
        }
        out
    }
}
