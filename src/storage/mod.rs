//! Key/value backends that persisted stores write through.
//!
//! The store never picks a backend on its own; an adapter is handed to
//! [`StoreBuilder::persist`](crate::StoreBuilder::persist) explicitly.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;
use async_trait::async_trait;

/// Durable key/value medium holding serialized (optionally encrypted) state.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Write `value` under `key`, replacing any previous record.
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Read the record under `key`, or `None` if nothing was ever saved.
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
}
