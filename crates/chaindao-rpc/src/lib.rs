//! chaindao-rpc — [`ChainTransport`](chaindao_core::ChainTransport) over
//! HTTP JSON-RPC.
//!
//! ```text
//! HttpTransport
//!     ├── request.rs  (JSON-RPC 2.0 wire types)
//!     ├── codec.rs    (hex quantities, logs, blocks, receipts)
//!     └── RetryPolicy (transient HTTP failures only)
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod request;

pub use client::HttpTransport;
pub use error::RpcError;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
