//! chaindao-storage — durable [`KeyValueStore`] backends.
//!
//! Backends:
//! - [`MemoryStore`] (re-exported from core): no persistence
//! - [`json`]: a single JSON object file, rewritten atomically
//! - [`sqlite`]: SQLite via `sqlx` (feature `sqlite`)

use std::path::Path;
use std::sync::Arc;

use chaindao_core::{DaoError, KeyValueStore};

pub mod json;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chaindao_core::MemoryStore;
pub use json::JsonFileStore;

/// Open the backend matching `path`: `.db`/`.sqlite` files use SQLite (when
/// built with the `sqlite` feature), anything else the JSON file store.
pub async fn open_store(path: impl AsRef<Path>) -> Result<Arc<dyn KeyValueStore>, DaoError> {
    let path = path.as_ref();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if matches!(ext, "db" | "sqlite") {
        #[cfg(feature = "sqlite")]
        {
            let store = sqlite::SqliteStore::open(&path.to_string_lossy()).await?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "sqlite"))]
        return Err(DaoError::Config(format!(
            "{} needs the `sqlite` feature",
            path.display()
        )));
    }
    Ok(Arc::new(JsonFileStore::open(path).await?))
}
