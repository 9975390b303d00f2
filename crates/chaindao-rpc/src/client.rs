//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! Transient failures (connection errors, timeouts, non-2xx responses) are
//! retried with exponential backoff; node-side errors are returned as-is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::Bytes;
use async_trait::async_trait;
use chaindao_core::{
    BlockInfo, ChainTransport, DaoError, LogFilter, RawLog, RetryPolicy, RpcConfig, TxReceipt,
};
use serde_json::{json, Value};

use crate::codec;
use crate::error::RpcError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// JSON-RPC node reached over HTTP.
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
    from: Option<String>,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Client for `config.endpoint()`.
    pub fn new(config: &RpcConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;

        Ok(Self {
            url: config.endpoint(),
            http,
            retry: RetryPolicy::new(config.retry.clone()),
            request_timeout: config.request_timeout(),
            from: config.from.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Account used as the sender of transactions.
    pub fn with_sender(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Send one request, retrying transient failures.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let req = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return resp.into_result().map_err(RpcError::Rpc),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %self.url,
                            method,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            url = %self.url,
                            method,
                            "max retries exceeded"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, RpcError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| RpcError::decode(&req.method, e))
    }

    fn http_error(&self, e: reqwest::Error) -> RpcError {
        if e.is_timeout() {
            RpcError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            RpcError::Http(e.to_string())
        }
    }

    async fn sender(&self) -> Result<String, RpcError> {
        if let Some(from) = &self.from {
            return Ok(from.clone());
        }
        let accounts = self.request("eth_accounts", vec![]).await?;
        accounts
            .get(0)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RpcError::decode("eth_accounts", "node has no unlocked accounts"))
    }
}

#[async_trait]
impl ChainTransport for HttpTransport {
    async fn network_id(&self) -> Result<String, DaoError> {
        let v = self.request("net_version", vec![]).await?;
        match v {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(RpcError::decode("net_version", format!("unexpected {other}")).into()),
        }
    }

    async fn code_at(&self, address: &str) -> Result<Bytes, DaoError> {
        let v = self
            .request("eth_getCode", vec![json!(address), json!("latest")])
            .await?;
        Ok(codec::parse_bytes("eth_getCode", &v)?)
    }

    async fn call(&self, to: &str, data: Bytes) -> Result<Bytes, DaoError> {
        let call = json!({ "to": to, "data": format!("0x{}", hex::encode(&data)) });
        let v = self.request("eth_call", vec![call, json!("latest")]).await?;
        Ok(codec::parse_bytes("eth_call", &v)?)
    }

    async fn send_transaction(&self, to: &str, data: Bytes) -> Result<TxReceipt, DaoError> {
        let from = self.sender().await?;
        let tx = json!({ "from": from, "to": to, "data": format!("0x{}", hex::encode(&data)) });
        let v = self.request("eth_sendTransaction", vec![tx]).await?;
        let tx_hash = v
            .as_str()
            .ok_or_else(|| {
                RpcError::decode("eth_sendTransaction", format!("expected hash, got {v}"))
            })?
            .to_string();
        let receipt = self
            .request("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;
        Ok(codec::parse_receipt(tx_hash, receipt)?)
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, DaoError> {
        let v = self
            .request("eth_getLogs", vec![codec::filter_params(filter)])
            .await?;
        Ok(codec::parse_logs(v)?)
    }

    async fn current_block_height(&self) -> Result<u64, DaoError> {
        let v = self.request("eth_blockNumber", vec![]).await?;
        Ok(codec::parse_quantity("eth_blockNumber", &v)?)
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>, DaoError> {
        let v = self
            .request(
                "eth_getBlockByNumber",
                vec![json!(codec::to_quantity(number)), json!(false)],
            )
            .await?;
        Ok(codec::parse_block(v)?)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaindao_core::RetryConfig;

    #[test]
    fn endpoint_from_host_and_port() {
        let config = RpcConfig {
            host: "0.0.0.0".into(),
            port: 9545,
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.url(), "http://localhost:9545");
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_error() {
        let config = RpcConfig {
            url: Some("http://127.0.0.1:1".into()),
            request_timeout_ms: 1_000,
            retry: RetryConfig {
                max_retries: Some(1),
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
                multiplier: 1.0,
            },
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let err = transport.current_block_height().await.unwrap_err();
        assert!(matches!(err, DaoError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn explicit_sender_skips_account_lookup() {
        let config = RpcConfig {
            url: Some("http://127.0.0.1:1".into()),
            request_timeout_ms: 1_000,
            retry: RetryConfig {
                max_retries: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        let without = HttpTransport::new(&config).unwrap();
        assert!(without.sender().await.is_err());

        let with = HttpTransport::new(&config)
            .unwrap()
            .with_sender("0x00000000000000000000000000000000000000aa");
        assert_eq!(
            with.sender().await.unwrap(),
            "0x00000000000000000000000000000000000000aa"
        );
    }
}
