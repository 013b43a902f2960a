use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::Result;
use crate::codec::Encoder;
use crate::message::{Message, Payload};
use crate::sink::Sink;
use crate::store::Storage;

/// StoreSink writes the value of every message, encoded with `E`, under the message key.
pub struct StoreSink<V, E> {
    store: Arc<dyn Storage>,
    encoder: E,
    _value: PhantomData<fn(V)>,
}

impl<V, E> StoreSink<V, E> {
    pub fn new(store: Arc<dyn Storage>, encoder: E) -> Self {
        Self {
            store,
            encoder,
            _value: PhantomData,
        }
    }
}

impl<V, E> Sink<String, V> for StoreSink<V, E>
where
    V: Payload,
    E: Encoder<V>,
{
    async fn write(&mut self, messages: &[Message<String, V>]) -> Result<()> {
        for msg in messages {
            let data = self.encoder.encode(msg.value())?;
            self.store.set(msg.key(), Bytes::from(data)).await?;
        }
        debug!(count = messages.len(), "Stored messages");
        Ok(())
    }
}
