//! Key-value storage backends consumed by the [StoreSink](crate::sink::StoreSink).
//!
//! The trait uses `async_trait` to stay object safe, so a backend can be shared as
//! `Arc<dyn Storage>`.

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Open the backend, called once before first use.
    async fn open(&self) -> Result<()>;

    /// Close the backend.
    async fn close(&self) -> Result<()>;

    /// Whether the key exists.
    async fn has(&self, key: &str) -> Result<bool>;

    /// Get the value for a given key.
    ///
    /// # Returns
    /// * `Ok(Some(value))` - If the key exists
    /// * `Ok(None)` - If the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Insert or update a key-value pair.
    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Delete a key, deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
