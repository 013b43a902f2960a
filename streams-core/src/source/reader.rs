use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Result;
use crate::error::Error;
use crate::message::{Marker, Message};
use crate::source::Source;

/// ReaderSource emits every non-empty line of the reader, keyed by its line number which is also
/// the offset. Nothing can be committed back to a reader, so no marker is attached. A read error
/// ends the source and becomes its terminal error.
pub struct ReaderSource<R> {
    topic: String,
    reader: Mutex<Option<R>>,
    error: Arc<Mutex<Option<Error>>>,
}

impl<R> ReaderSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(topic: impl Into<String>, reader: R) -> Self {
        Self {
            topic: topic.into(),
            reader: Mutex::new(Some(reader)),
            error: Arc::new(Mutex::new(None)),
        }
    }
}

impl<R> Source<u64, String> for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn messages(&self, _marker: Marker<u64, String>) -> mpsc::Receiver<Message<u64, String>> {
        let (tx, rx) = mpsc::channel(1);
        let Some(reader) = self.reader.lock().take() else {
            warn!(topic = %self.topic, "Reader source has already been consumed");
            return rx;
        };

        let topic = self.topic.clone();
        let error = Arc::clone(&self.error);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut line_no: u64 = 0;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        // published before the channel closes
                        *error.lock() = Some(Error::Source(format!("reading {topic}: {e}")));
                        break;
                    }
                };
                let offset = line_no;
                line_no += 1;
                if line.is_empty() {
                    continue;
                }

                let msg = Message::new(offset, line, offset as i64, 0, topic.as_str(), None);
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            debug!(topic = %topic, lines = line_no, "Reader source exhausted");
        });
        rx
    }

    async fn commit(&self, _messages: Vec<Message<u64, String>>) -> Result<()> {
        Ok(())
    }

    fn error(&self) -> Option<Error> {
        self.error.lock().clone()
    }
}
