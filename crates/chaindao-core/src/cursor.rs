//! Watch cursor: the last block height already delivered, persisted so a
//! restart resumes instead of redelivering.
//!
//! One cursor is shared by every watch in a [`WatchManager`](crate::watch::WatchManager).
//! Writes go through a single lock and only ever move the cursor forward, so
//! two watches observing overlapping ranges cannot persist out of order.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::DaoError;
use crate::storage::KeyValueStore;

/// Storage key the cursor is persisted under by default.
pub const DEFAULT_CURSOR_KEY: &str = "chronoBankWatchFromBlock";

/// Durable, monotonically non-decreasing block cursor.
pub struct WatchCursor {
    store: Arc<dyn KeyValueStore>,
    key: String,
    /// Last value read from or written to the store.
    last: Mutex<Option<u64>>,
}

impl WatchCursor {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            last: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted block number (`None` if nothing was ever stored).
    pub async fn load(&self) -> Result<Option<u64>, DaoError> {
        let mut last = self.last.lock().await;
        let stored = self.read_store().await?;
        *last = max_opt(*last, stored);
        Ok(*last)
    }

    /// Block a new watch should start from: cursor + 1, or `None` without a cursor.
    pub async fn next_block(&self) -> Result<Option<u64>, DaoError> {
        Ok(self.load().await?.map(|b| b.saturating_add(1)))
    }

    /// Move the cursor to `block` and persist it.
    ///
    /// Returns `false` (and writes nothing) if `block` is not ahead of the
    /// current value.
    pub async fn advance(&self, block: u64) -> Result<bool, DaoError> {
        let mut last = self.last.lock().await;
        if last.is_none() {
            *last = self.read_store().await?;
        }
        if matches!(*last, Some(current) if block <= current) {
            return Ok(false);
        }
        self.store.set(&self.key, &block.to_string()).await?;
        *last = Some(block);
        tracing::debug!(key = %self.key, block, "watch cursor advanced");
        Ok(true)
    }

    /// Forget the cursor (next watch starts from the chain head).
    pub async fn reset(&self) -> Result<(), DaoError> {
        let mut last = self.last.lock().await;
        self.store.remove(&self.key).await?;
        *last = None;
        Ok(())
    }

    async fn read_store(&self) -> Result<Option<u64>, DaoError> {
        match self.store.get(&self.key).await? {
            None => Ok(None),
            Some(text) => text.trim().parse::<u64>().map(Some).map_err(|e| {
                DaoError::Storage(format!("cursor '{}' holds {text:?}: {e}", self.key))
            }),
        }
    }
}

fn max_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}
