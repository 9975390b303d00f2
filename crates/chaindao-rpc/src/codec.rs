//! Conversions between JSON-RPC values and ChainDAO types.
//!
//! Quantities are `0x`-prefixed hex without leading zeros; data is
//! `0x`-prefixed hex of any length.

use alloy_primitives::{Bytes, B256};
use chaindao_core::{BlockInfo, LogFilter, RawLog, TxReceipt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::RpcError;

/// `0x`-hex quantity for `n`.
pub fn to_quantity(n: u64) -> String {
    format!("0x{n:x}")
}

/// Parse a hex quantity string.
pub fn parse_quantity(method: &str, value: &Value) -> Result<u64, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::decode(method, format!("expected hex quantity, got {value}")))?;
    quantity_from_str(method, s)
}

fn quantity_from_str(method: &str, s: &str) -> Result<u64, RpcError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::decode(method, format!("quantity {s:?} lacks 0x prefix")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| RpcError::decode(method, format!("quantity {s:?}: {e}")))
}

/// Parse hex data (`"0x"` is empty).
pub fn parse_bytes(method: &str, value: &Value) -> Result<Bytes, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::decode(method, format!("expected hex data, got {value}")))?;
    bytes_from_str(method, s)
}

fn bytes_from_str(method: &str, s: &str) -> Result<Bytes, RpcError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| RpcError::decode(method, format!("data {s:?}: {e}")))
}

fn word_from_str(method: &str, s: &str) -> Result<B256, RpcError> {
    let bytes = bytes_from_str(method, s)?;
    if bytes.len() != 32 {
        return Err(RpcError::decode(method, format!("topic {s:?} is not 32 bytes")));
    }
    Ok(B256::from_slice(&bytes))
}

/// The `eth_getLogs` filter object for `filter`.
pub fn filter_params(filter: &LogFilter) -> Value {
    let topics: Vec<Value> = match filter.topic0 {
        Some(topic) => vec![Value::from(format!("0x{}", hex::encode(topic)))],
        None => Vec::new(),
    };
    json!({
        "address": filter.address,
        "fromBlock": to_quantity(filter.from_block),
        "toBlock": to_quantity(filter.to_block),
        "topics": topics,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    transaction_hash: Option<String>,
    #[serde(default)]
    removed: bool,
}

/// Parse an `eth_getLogs` result. Pending logs (no block yet) are dropped.
pub fn parse_logs(value: Value) -> Result<Vec<RawLog>, RpcError> {
    const METHOD: &str = "eth_getLogs";
    let wire: Vec<WireLog> =
        serde_json::from_value(value).map_err(|e| RpcError::decode(METHOD, e))?;
    let mut logs = Vec::with_capacity(wire.len());
    for log in wire {
        let (Some(block), Some(index)) = (log.block_number, log.log_index) else {
            continue;
        };
        logs.push(RawLog {
            address: log.address,
            topics: log
                .topics
                .iter()
                .map(|t| word_from_str(METHOD, t))
                .collect::<Result<_, _>>()?,
            data: bytes_from_str(METHOD, &log.data)?,
            block_number: quantity_from_str(METHOD, &block)?,
            log_index: quantity_from_str(METHOD, &index)?,
            tx_hash: log.transaction_hash.unwrap_or_default(),
            removed: log.removed,
        });
    }
    Ok(logs)
}

#[derive(Deserialize)]
struct WireBlock {
    number: Option<String>,
    hash: Option<String>,
    timestamp: String,
}

/// Parse an `eth_getBlockByNumber` result; `null` means no such block yet.
pub fn parse_block(value: Value) -> Result<Option<BlockInfo>, RpcError> {
    const METHOD: &str = "eth_getBlockByNumber";
    if value.is_null() {
        return Ok(None);
    }
    let wire: WireBlock = serde_json::from_value(value).map_err(|e| RpcError::decode(METHOD, e))?;
    let (Some(number), Some(hash)) = (wire.number, wire.hash) else {
        // pending block
        return Ok(None);
    };
    let timestamp = quantity_from_str(METHOD, &wire.timestamp)?;
    Ok(Some(BlockInfo {
        number: quantity_from_str(METHOD, &number)?,
        hash,
        timestamp: i64::try_from(timestamp).map_err(|e| RpcError::decode(METHOD, e))?,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceipt {
    block_number: Option<String>,
    status: Option<String>,
}

/// Parse an `eth_getTransactionReceipt` result; `null` is a pending receipt.
pub fn parse_receipt(tx_hash: String, value: Value) -> Result<TxReceipt, RpcError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    if value.is_null() {
        return Ok(TxReceipt {
            tx_hash,
            block_number: None,
            status: true,
        });
    }
    let wire: WireReceipt = serde_json::from_value(value).map_err(|e| RpcError::decode(METHOD, e))?;
    let block_number = wire
        .block_number
        .as_deref()
        .map(|b| quantity_from_str(METHOD, b))
        .transpose()?;
    // pre-byzantium receipts carry no status
    let status = match wire.status.as_deref() {
        Some(s) => quantity_from_str(METHOD, s)? == 1,
        None => true,
    };
    Ok(TxReceipt {
        tx_hash,
        block_number,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities() {
        assert_eq!(to_quantity(0), "0x0");
        assert_eq!(to_quantity(1_000), "0x3e8");
        assert_eq!(parse_quantity("m", &json!("0x3e8")).unwrap(), 1_000);
        assert_eq!(parse_quantity("m", &json!("0x")).unwrap(), 0);
        assert!(parse_quantity("m", &json!("1000")).is_err());
        assert!(parse_quantity("m", &json!(1000)).is_err());
    }

    #[test]
    fn empty_code_is_empty_bytes() {
        assert!(parse_bytes("eth_getCode", &json!("0x")).unwrap().is_empty());
        assert_eq!(parse_bytes("eth_getCode", &json!("0x6080")).unwrap().as_ref(), &[0x60, 0x80]);
        assert!(parse_bytes("eth_getCode", &json!("0xzz")).is_err());
    }

    #[test]
    fn filter_object() {
        let filter = LogFilter {
            address: "0x1111111111111111111111111111111111111111".into(),
            topic0: Some(B256::repeat_byte(0xab)),
            from_block: 16,
            to_block: 255,
        };
        let params = filter_params(&filter);
        assert_eq!(params["fromBlock"], "0x10");
        assert_eq!(params["toBlock"], "0xff");
        assert_eq!(params["topics"][0], format!("0x{}", "ab".repeat(32)));

        let anonymous = LogFilter { topic0: None, ..filter };
        assert_eq!(filter_params(&anonymous)["topics"], json!([]));
    }

    #[test]
    fn logs_skip_pending_entries() {
        let topic = format!("0x{}", "11".repeat(32));
        let logs = parse_logs(json!([
            {
                "address": "0x2222222222222222222222222222222222222222",
                "topics": [topic],
                "data": "0x01",
                "blockNumber": "0xa",
                "logIndex": "0x2",
                "transactionHash": "0xfeed",
                "removed": false
            },
            {
                "address": "0x2222222222222222222222222222222222222222",
                "topics": [],
                "data": "0x",
                "blockNumber": null,
                "logIndex": null,
                "transactionHash": null
            }
        ]))
        .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].position(), (10, 2));
        assert_eq!(logs[0].topics[0], B256::repeat_byte(0x11));
        assert_eq!(logs[0].data.as_ref(), &[0x01]);
        assert_eq!(logs[0].tx_hash, "0xfeed");
    }

    #[test]
    fn short_topic_is_rejected() {
        let err = parse_logs(json!([{
            "address": "0x2222222222222222222222222222222222222222",
            "topics": ["0x1234"],
            "data": "0x",
            "blockNumber": "0x1",
            "logIndex": "0x0"
        }]))
        .unwrap_err();
        assert!(matches!(err, RpcError::Decode { .. }));
    }

    #[test]
    fn blocks() {
        assert_eq!(parse_block(Value::Null).unwrap(), None);
        let block = parse_block(json!({
            "number": "0x64",
            "hash": "0xbeef",
            "timestamp": "0x5f5e100",
            "transactions": []
        }))
        .unwrap()
        .unwrap();
        assert_eq!(block.number, 100);
        assert_eq!(block.timestamp, 100_000_000);
        assert_eq!(block.timestamp_ms(), 100_000_000_000);
    }

    #[test]
    fn receipts() {
        let pending = parse_receipt("0x01".into(), Value::Null).unwrap();
        assert_eq!(pending.block_number, None);
        assert!(pending.status);

        let reverted =
            parse_receipt("0x02".into(), json!({"blockNumber": "0x5", "status": "0x0"})).unwrap();
        assert_eq!(reverted.block_number, Some(5));
        assert!(!reverted.status);

        let legacy =
            parse_receipt("0x03".into(), json!({"blockNumber": "0x5", "root": "0xab"})).unwrap();
        assert!(legacy.status);
    }
}
