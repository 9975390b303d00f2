//! JSON file backend.
//!
//! The whole store is one JSON object of string values, loaded on open and
//! rewritten on every change. Writes go to a sibling temp file that is then
//! renamed over the store file, so a crash never leaves a torn file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chaindao_core::{DaoError, KeyValueStore};
use tokio::sync::Mutex;
use tracing::debug;

/// File-backed store.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Load `path`, or start empty if it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DaoError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| DaoError::Storage(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(DaoError::Storage(format!("{}: {e}", path.display()))),
        };
        debug!(path = %path.display(), keys = entries.len(), "opened JSON store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), DaoError> {
        let bytes =
            serde_json::to_vec_pretty(entries).map_err(|e| DaoError::Storage(e.to_string()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| DaoError::Storage(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| DaoError::Storage(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DaoError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DaoError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries).await {
            // keep memory in step with disk
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DaoError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaindao_core::{WatchCursor, DEFAULT_CURSOR_KEY};
    use std::sync::Arc;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.remove("b").await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get("b").await.unwrap(), None);
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonFileStore::open(&path).await.err().unwrap();
        assert!(matches!(err, DaoError::Storage(_)));
    }

    #[tokio::test]
    async fn empty_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "\n").unwrap();
        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.get(DEFAULT_CURSOR_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn cursor_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");

        let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
        let cursor = WatchCursor::new(store, DEFAULT_CURSOR_KEY);
        assert!(cursor.advance(41).await.unwrap());
        assert!(!cursor.advance(40).await.unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[DEFAULT_CURSOR_KEY], "41");

        let reopened = Arc::new(JsonFileStore::open(&path).await.unwrap());
        let cursor = WatchCursor::new(reopened, DEFAULT_CURSOR_KEY);
        assert_eq!(cursor.next_block().await.unwrap(), Some(42));
    }
}
