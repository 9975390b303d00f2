//! chaindao-core — typed access to deployed contracts and durable event watches.
//!
//! # Architecture
//!
//! ```text
//! ContractDescriptor (ABI + per-network deployments)
//!        │
//!        ▼
//! ContractDao ── ContractHandle (settle-once, shared by every caller)
//!        │              └── Binder: network id → address → code confirmation
//!        ├── call / send    (ABI-encoded through the ChainTransport)
//!        └── ContractBinding / ProxyContract (concrete DAOs)
//!
//! WatchManager
//!        ├── WatchSubscription per event   (own task, own stop signal)
//!        ├── WatchCursor                   (last delivered block, durable)
//!        └── KeyValueStore backend         (memory / JSON file / SQLite)
//! ```
//!
//! Transports live outside this crate (`chaindao-rpc` for JSON-RPC over
//! HTTP); [`mock::MockTransport`] scripts chain state in tests.

pub mod abi;
pub mod address;
pub mod config;
pub mod contract;
pub mod cursor;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod mock;
pub mod proxy;
pub mod retry;
pub mod storage;
pub mod transport;
pub mod types;
pub mod watch;

pub use address::{is_empty_address, is_valid_address, ZERO_ADDRESS};
pub use config::{
    BindStrategy, DaoConfig, LogConfig, ResolverConfig, RpcConfig, WatchConfig, WatchConfigBuilder,
};
pub use contract::{ContractBinding, ContractDao, GenericContract};
pub use cursor::{WatchCursor, DEFAULT_CURSOR_KEY};
pub use descriptor::{ContractDescriptor, NetworkDeployment};
pub use error::DaoError;
pub use handle::{BoundContract, ContractHandle, DeploymentTarget, HandleState};
pub use proxy::{AssetProxyDao, ProxyContract};
pub use retry::{RetryConfig, RetryPolicy};
pub use storage::{KeyValueStore, MemoryStore};
pub use transport::{ChainTransport, TransportHandle};
pub use types::{BlockInfo, LogFilter, RawLog, TxReceipt};
pub use watch::{
    ErrorAction, SubscriptionState, WatchEvent, WatchHandler, WatchManager, WatchSubscription,
};
