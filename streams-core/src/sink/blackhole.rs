use crate::Result;
use crate::message::{Message, Payload};
use crate::sink::Sink;

/// Blackhole is a sink to emulate /dev/null
pub struct BlackholeSink;

impl<K: Payload, V: Payload> Sink<K, V> for BlackholeSink {
    async fn write(&mut self, _messages: &[Message<K, V>]) -> Result<()> {
        Ok(())
    }
}
