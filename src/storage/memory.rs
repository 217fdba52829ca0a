use super::StorageAdapter;
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-process storage. Clones share the same records.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    records: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a record without going through the async adapter interface.
    pub fn get(&self, key: &str) -> Option<String> {
        self.records.read().get(key).cloned()
    }

    /// Seed a record directly.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.records.write().insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.records.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key))
    }
}
