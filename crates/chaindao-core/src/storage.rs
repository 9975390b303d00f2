//! Durable key/value storage used for the watch cursor.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::DaoError;

/// Trait for durable string key/value storage.
///
/// Implementations include [`MemoryStore`], `JsonFileStore` and `SqliteStore`
/// (the latter two in `chaindao-storage`).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, DaoError>;

    /// Insert or overwrite.
    async fn set(&self, key: &str, value: &str) -> Result<(), DaoError>;

    async fn remove(&self, key: &str) -> Result<(), DaoError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory store for tests and ephemeral watchers.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key.
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.data.lock().unwrap().insert(key.to_string(), value.to_string());
        self
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DaoError> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DaoError> {
        self.data.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DaoError> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());

        store.set("k", "10").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("10"));

        store.remove("k").await.unwrap();
        assert!(store.is_empty());
    }
}
