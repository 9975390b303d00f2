//! Scriptable in-memory transport for tests and examples.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Function;
use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;

use crate::error::DaoError;
use crate::transport::ChainTransport;
use crate::types::{BlockInfo, LogFilter, RawLog, TxReceipt};

#[derive(Default)]
struct MockState {
    /// Deployed code and the number of lookups that still see it as absent.
    code: HashMap<String, (Bytes, u32)>,
    calls: HashMap<(String, [u8; 4]), Bytes>,
    logs: Vec<RawLog>,
    blocks: HashMap<u64, i64>,
    queries: Vec<LogFilter>,
    sent: Vec<(String, Bytes)>,
    code_error: Option<String>,
    /// Answer log queries with every matching log, whatever the block range.
    ignore_ranges: bool,
    /// Log queries starting above this block always fail.
    failing_from: Option<u64>,
}

/// In-memory [`ChainTransport`] whose chain state is set up by the test.
pub struct MockTransport {
    network_id: String,
    state: Mutex<MockState>,
    height: AtomicU64,
    code_delay: Mutex<Duration>,
    failing_log_queries: AtomicU32,
    code_lookups: AtomicU32,
    network_lookups: AtomicU32,
}

impl MockTransport {
    pub fn new(network_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            state: Mutex::new(MockState::default()),
            height: AtomicU64::new(0),
            code_delay: Mutex::new(Duration::ZERO),
            failing_log_queries: AtomicU32::new(0),
            code_lookups: AtomicU32::new(0),
            network_lookups: AtomicU32::new(0),
        }
    }

    /// Mark `address` as holding contract code.
    pub fn deploy(&self, address: &str) {
        self.deploy_after(address, 0);
    }

    /// Code at `address` only becomes visible after `lookups` empty answers.
    pub fn deploy_after(&self, address: &str, lookups: u32) {
        self.state
            .lock()
            .unwrap()
            .code
            .insert(address.to_lowercase(), (Bytes::from_static(&[0x60, 0x80]), lookups));
    }

    /// Make every code lookup fail with a transport error.
    pub fn fail_code_lookups(&self, reason: &str) {
        self.state.lock().unwrap().code_error = Some(reason.to_string());
    }

    /// Sleep this long inside every code lookup.
    pub fn set_code_delay(&self, delay: Duration) {
        *self.code_delay.lock().unwrap() = delay;
    }

    /// Answer calls of `function` on `address` with `outputs`.
    pub fn respond(&self, address: &str, function: &Function, outputs: Vec<DynSolValue>) {
        let data = DynSolValue::Tuple(outputs).abi_encode_params();
        self.state
            .lock()
            .unwrap()
            .calls
            .insert((address.to_lowercase(), function.selector().0), data.into());
    }

    /// Append a log and make sure its block exists.
    pub fn push_log(&self, log: RawLog) {
        let number = log.block_number;
        let mut state = self.state.lock().unwrap();
        state.blocks.entry(number).or_insert(1_000 + number as i64 * 15);
        state.logs.push(log);
        drop(state);
        self.height.fetch_max(number, Ordering::SeqCst);
    }

    /// Set a block's timestamp (seconds).
    pub fn set_block_timestamp(&self, number: u64, timestamp: i64) {
        self.state.lock().unwrap().blocks.insert(number, timestamp);
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// The next `n` log queries fail with a transport error.
    pub fn fail_next_log_queries(&self, n: u32) {
        self.failing_log_queries.store(n, Ordering::SeqCst);
    }

    /// Every log query starting above `block` fails until the test ends.
    pub fn fail_log_queries_from(&self, block: u64) {
        self.state.lock().unwrap().failing_from = Some(block);
    }

    /// Behave like a node that ignores `fromBlock`/`toBlock`.
    pub fn ignore_log_ranges(&self) {
        self.state.lock().unwrap().ignore_ranges = true;
    }

    /// Log queries received so far.
    pub fn log_queries(&self) -> Vec<LogFilter> {
        self.state.lock().unwrap().queries.clone()
    }

    /// Transactions received so far as `(to, calldata)`.
    pub fn sent_transactions(&self) -> Vec<(String, Bytes)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn code_lookups(&self) -> u32 {
        self.code_lookups.load(Ordering::SeqCst)
    }

    pub fn network_lookups(&self) -> u32 {
        self.network_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainTransport for MockTransport {
    async fn network_id(&self) -> Result<String, DaoError> {
        self.network_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.network_id.clone())
    }

    async fn code_at(&self, address: &str) -> Result<Bytes, DaoError> {
        self.code_lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.code_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.code_error {
            return Err(DaoError::Transport(reason.clone()));
        }
        match state.code.get_mut(&address.to_lowercase()) {
            Some((_, pending)) if *pending > 0 => {
                *pending -= 1;
                Ok(Bytes::new())
            }
            Some((code, _)) => Ok(code.clone()),
            None => Ok(Bytes::new()),
        }
    }

    async fn call(&self, to: &str, data: Bytes) -> Result<Bytes, DaoError> {
        if data.len() < 4 {
            return Err(DaoError::Transport("calldata too short".into()));
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&(to.to_lowercase(), selector))
            .cloned()
            .ok_or_else(|| {
                DaoError::Transport(format!("execution reverted: 0x{}", hex::encode(selector)))
            })
    }

    async fn send_transaction(&self, to: &str, data: Bytes) -> Result<TxReceipt, DaoError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((to.to_string(), data));
        let n = state.sent.len() as u8;
        Ok(TxReceipt {
            tx_hash: B256::repeat_byte(n).to_string(),
            block_number: Some(self.height.load(Ordering::SeqCst)),
            status: true,
        })
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, DaoError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(filter.clone());
        let failing = self.failing_log_queries.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_log_queries.store(failing - 1, Ordering::SeqCst);
            return Err(DaoError::Transport("eth_getLogs: connection reset".into()));
        }
        if state.failing_from.is_some_and(|from| filter.from_block > from) {
            return Err(DaoError::Transport("eth_getLogs: request timed out".into()));
        }
        let filter = if state.ignore_ranges {
            LogFilter {
                from_block: 0,
                to_block: u64::MAX,
                ..filter.clone()
            }
        } else {
            filter.clone()
        };
        Ok(state.logs.iter().filter(|l| filter.matches(l)).cloned().collect())
    }

    async fn current_block_height(&self) -> Result<u64, DaoError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>, DaoError> {
        Ok(self.state.lock().unwrap().blocks.get(&number).map(|ts| BlockInfo {
            number,
            hash: format!("0x{number:064x}"),
            timestamp: *ts,
        }))
    }

    fn url(&self) -> &str {
        "mock://"
    }
}
