//! In-memory [Storage] over a sorted map.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use streams_core::store::Storage;
use tracing::debug;

use crate::error::SimpleAdapterError;
use crate::error_injector::ErrorInjector;

struct Inner {
    data: RwLock<BTreeMap<String, Bytes>>,
    injector: ErrorInjector,
}

/// Key value store keeping its keys sorted. Empty values are rejected. Clones share the data.
#[derive(Clone)]
pub struct SimpleKvStore {
    inner: Arc<Inner>,
}

impl Default for SimpleKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleKvStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(BTreeMap::new()),
                injector: ErrorInjector::new(),
            }),
        }
    }

    /// Stored keys in ascending order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.data.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }

    /// Copy of the stored data.
    pub fn snapshot(&self) -> BTreeMap<String, Bytes> {
        self.inner.data.read().clone()
    }

    pub fn error_injector(&self) -> &ErrorInjector {
        &self.inner.injector
    }
}

#[async_trait]
impl Storage for SimpleKvStore {
    async fn open(&self) -> streams_core::Result<()> {
        debug!("Opening simple kv store");
        Ok(())
    }

    async fn close(&self) -> streams_core::Result<()> {
        debug!(keys = self.len(), "Closing simple kv store");
        Ok(())
    }

    async fn has(&self, key: &str) -> streams_core::Result<bool> {
        Ok(self.inner.data.read().contains_key(key))
    }

    async fn get(&self, key: &str) -> streams_core::Result<Option<Bytes>> {
        if self.inner.injector.should_fail_get() {
            return Err(SimpleAdapterError::Store(format!("injected failure getting {key}")).into());
        }
        Ok(self.inner.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> streams_core::Result<()> {
        self.inner.injector.apply_set_latency().await;
        if self.inner.injector.should_fail_set() {
            return Err(SimpleAdapterError::Store(format!("injected failure setting {key}")).into());
        }
        if value.is_empty() {
            return Err(SimpleAdapterError::EmptyValue(key.to_string()).into());
        }
        self.inner.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> streams_core::Result<()> {
        if self.inner.injector.should_fail_delete() {
            return Err(
                SimpleAdapterError::Store(format!("injected failure deleting {key}")).into(),
            );
        }
        self.inner.data.write().remove(key);
        Ok(())
    }
}
