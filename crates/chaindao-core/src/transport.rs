//! The [`ChainTransport`] capability every RPC backend provides, and the
//! shared [`TransportHandle`].

use std::fmt;
use std::sync::Arc;

use alloy_primitives::Bytes;
use async_trait::async_trait;

use crate::error::DaoError;
use crate::types::{BlockInfo, LogFilter, RawLog, TxReceipt};

/// The operations ChainDAO needs from a chain connection.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one instance is shared by every
/// contract handle and watch in the process.
#[async_trait]
pub trait ChainTransport: Send + Sync + 'static {
    /// Identifier of the connected network (`net_version`).
    async fn network_id(&self) -> Result<String, DaoError>;

    /// Deployed bytecode at `address` (empty if none).
    async fn code_at(&self, address: &str) -> Result<Bytes, DaoError>;

    /// Execute a read-only call against `to`.
    async fn call(&self, to: &str, data: Bytes) -> Result<Bytes, DaoError>;

    /// Submit a state-changing transaction to `to`.
    async fn send_transaction(&self, to: &str, data: Bytes) -> Result<TxReceipt, DaoError>;

    /// All logs matching `filter` within its inclusive block range.
    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, DaoError>;

    /// Latest block number.
    async fn current_block_height(&self) -> Result<u64, DaoError>;

    /// Block header by number (`None` if not yet produced).
    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>, DaoError>;

    /// Endpoint URL or name, for logs.
    fn url(&self) -> &str;
}

/// A process-wide, read-only handle to the chain connection.
///
/// Created once and cloned into every DAO; cloning is an `Arc` bump.
#[derive(Clone)]
pub struct TransportHandle {
    inner: Arc<dyn ChainTransport>,
}

impl TransportHandle {
    pub fn new<T: ChainTransport>(transport: T) -> Self {
        Self {
            inner: Arc::new(transport),
        }
    }

    pub fn from_arc(inner: Arc<dyn ChainTransport>) -> Self {
        Self { inner }
    }

    pub fn url(&self) -> &str {
        self.inner.url()
    }
}

impl std::ops::Deref for TransportHandle {
    type Target = dyn ChainTransport;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle").field("url", &self.url()).finish()
    }
}
