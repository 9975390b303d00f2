//! Configuration types.
//!
//! Every section has sensible defaults, so a config file only needs the
//! fields it changes:
//!
//! ```json
//! { "rpc": { "host": "0.0.0.0", "port": 8545 }, "watch": { "poll_interval_ms": 1000 } }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cursor::DEFAULT_CURSOR_KEY;
use crate::error::DaoError;
use crate::retry::RetryConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    pub rpc: RpcConfig,
    pub resolver: ResolverConfig,
    pub watch: WatchConfig,
    pub log: LogConfig,
}

impl DaoConfig {
    pub fn from_json(json: &str) -> Result<Self, DaoError> {
        serde_json::from_str(json).map_err(|e| DaoError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DaoError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DaoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}

// ─── RPC ──────────────────────────────────────────────────────────────────────

/// Where the chain's JSON-RPC endpoint lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Full endpoint URL; overrides `host`/`port` when set.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: u64,
    /// Sender of transactions; the node's first account when unset.
    pub from: Option<String>,
    /// Backoff for transient HTTP failures.
    pub retry: RetryConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".into(),
            port: 8545,
            request_timeout_ms: 30_000,
            from: None,
            retry: RetryConfig {
                max_retries: Some(3),
                initial_backoff_ms: 100,
                max_backoff_ms: 10_000,
                multiplier: 2.0,
            },
        }
    }
}

impl RpcConfig {
    /// The endpoint URL. A wildcard bind host (`0.0.0.0`) is reached via `localhost`.
    pub fn endpoint(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let host = if self.host == "0.0.0.0" { "localhost" } else { self.host.as_str() };
        format!("http://{host}:{}", self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ─── Resolver ─────────────────────────────────────────────────────────────────

/// How a contract handle is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindStrategy {
    /// Start resolving immediately in the background; every caller shares the outcome.
    #[default]
    Deferred,
    /// Resolve when the first caller awaits the handle.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub strategy: BindStrategy,
    /// Poll interval while waiting for deployed code to appear.
    pub confirmation_poll_interval_ms: u64,
    /// Give up waiting for deployed code after this long.
    pub confirmation_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy: BindStrategy::Deferred,
            confirmation_poll_interval_ms: 50,
            confirmation_timeout_ms: 30_000,
        }
    }
}

impl ResolverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

// ─── Watch ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Delay between log polls once caught up.
    pub poll_interval_ms: u64,
    /// Storage key of the shared cursor.
    pub cursor_key: String,
    /// Widest block range sent in one log query.
    pub max_block_range: u64,
    /// Backoff after a failed poll.
    pub retry: RetryConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            cursor_key: DEFAULT_CURSOR_KEY.into(),
            max_block_range: 1000,
            retry: RetryConfig::default(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Fluent builder for [`WatchConfig`].
#[derive(Debug, Default)]
pub struct WatchConfigBuilder {
    config: WatchConfig,
}

impl WatchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the storage key of the cursor.
    pub fn cursor_key(mut self, key: impl Into<String>) -> Self {
        self.config.cursor_key = key.into();
        self
    }

    /// Set the widest block range per log query.
    pub fn max_block_range(mut self, blocks: u64) -> Self {
        self.config.max_block_range = blocks;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn build(self) -> WatchConfig {
        self.config
    }
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
    /// Override per component: component_name → level
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter directives such as `"info,chaindao_core=debug"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let cfg = DaoConfig::default();
        assert_eq!(cfg.resolver.confirmation_poll_interval_ms, 50);
        assert_eq!(cfg.resolver.strategy, BindStrategy::Deferred);
        assert_eq!(cfg.watch.cursor_key, "chronoBankWatchFromBlock");
        assert_eq!(cfg.rpc.endpoint(), "http://localhost:8545");
    }

    #[test]
    fn wildcard_host_maps_to_localhost() {
        let rpc = RpcConfig { host: "0.0.0.0".into(), port: 9545, ..Default::default() };
        assert_eq!(rpc.endpoint(), "http://localhost:9545");

        let rpc = RpcConfig { url: Some("https://node.example".into()), ..Default::default() };
        assert_eq!(rpc.endpoint(), "https://node.example");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = DaoConfig::from_json(
            r#"{"resolver":{"strategy":"direct"},"watch":{"poll_interval_ms":10}}"#,
        )
        .unwrap();
        assert_eq!(cfg.resolver.strategy, BindStrategy::Direct);
        assert_eq!(cfg.resolver.confirmation_poll_interval_ms, 50);
        assert_eq!(cfg.watch.poll_interval_ms, 10);
        assert_eq!(cfg.watch.max_block_range, 1000);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        assert!(matches!(DaoConfig::from_json("[1,"), Err(DaoError::Config(_))));
    }

    #[test]
    fn watch_builder() {
        let cfg = WatchConfigBuilder::new()
            .poll_interval_ms(100)
            .cursor_key("k")
            .max_block_range(50)
            .build();
        assert_eq!(cfg.poll_interval_ms, 100);
        assert_eq!(cfg.cursor_key, "k");
        assert_eq!(cfg.max_block_range, 50);
    }

    #[test]
    fn log_directives_include_components() {
        let mut log = LogConfig::default();
        log.components.insert("chaindao-core".into(), "debug".into());
        assert_eq!(log.directives(), "info,chaindao_core=debug");
    }
}
