use tracing::info;

use crate::Result;
use crate::message::{Message, Payload};
use crate::sink::Sink;

/// LogSink emits one record per message.
pub struct LogSink;

impl<K: Payload, V: Payload> Sink<K, V> for LogSink {
    async fn write(&mut self, messages: &[Message<K, V>]) -> Result<()> {
        for msg in messages {
            info!(
                key = ?msg.key(),
                value = ?msg.value(),
                topic = msg.topic(),
                partition = msg.partition(),
                offset = msg.offset(),
                "Payload"
            );
        }
        Ok(())
    }
}
