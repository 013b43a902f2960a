use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::Result;
use crate::error::Error;
use crate::message::{Message, Payload};
use crate::sink::Sink;

/// WriterSink writes every value followed by a newline and flushes the writer once per batch,
/// so a batch is reported written only after it left the buffers.
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<K, V, W> Sink<K, V> for WriterSink<W>
where
    K: Payload,
    V: Payload + AsRef<[u8]>,
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, messages: &[Message<K, V>]) -> Result<()> {
        for msg in messages {
            self.writer
                .write_all(msg.value().as_ref())
                .await
                .map_err(|e| Error::Sink(format!("writing value: {e}")))?;
            self.writer
                .write_all(b"\n")
                .await
                .map_err(|e| Error::Sink(format!("writing delimiter: {e}")))?;
        }
        self.writer
            .flush()
            .await
            .map_err(|e| Error::Sink(format!("flushing writer: {e}")))?;
        debug!(count = messages.len(), "Wrote messages");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncReadExt, BufWriter};

    use super::*;

    fn message(value: &str) -> Message<String, String> {
        Message::new("k".to_string(), value.to_string(), 0, 0, "t", None)
    }

    #[tokio::test]
    async fn test_writes_lines() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write(&[message("a"), message("b")]).await.unwrap();
        sink.write(&[message("c")]).await.unwrap();
        assert_eq!(sink.get_ref().as_slice(), b"a\nb\nc\n");
    }

    #[tokio::test]
    async fn test_flushes_every_batch() {
        let (client, mut server) = tokio::io::duplex(64);
        // the buffer is larger than the batch, only the flush pushes it through
        let mut sink = WriterSink::new(BufWriter::with_capacity(1024, client));
        sink.write(&[message("hello")]).await.unwrap();

        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");
    }

    struct Closed;

    impl AsyncWrite for Closed {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_error() {
        let mut sink = WriterSink::new(Closed);
        let err = sink.write(&[message("a")]).await.unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
    }
}
