//! Shared types exchanged with the transport.

use alloy_primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};

// ─── Logs ─────────────────────────────────────────────────────────────────────

/// A raw log entry as returned by a range log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Contract that emitted the log.
    pub address: String,
    /// `topics[0]` is the event selector for non-anonymous events.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed event inputs.
    pub data: Bytes,
    pub block_number: u64,
    /// Position of the log within its block.
    pub log_index: u64,
    pub tx_hash: String,
    /// `true` if the log was dropped by a reorg.
    pub removed: bool,
}

impl RawLog {
    /// Sort key giving chain order.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// A block-range log query for one contract and (optionally) one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: String,
    pub topic0: Option<B256>,
    /// Inclusive.
    pub from_block: u64,
    /// Inclusive.
    pub to_block: u64,
}

impl LogFilter {
    /// Returns `true` if `log` falls inside this filter.
    pub fn matches(&self, log: &RawLog) -> bool {
        log.address.eq_ignore_ascii_case(&self.address)
            && (self.from_block..=self.to_block).contains(&log.block_number)
            && match self.topic0 {
                Some(topic) => log.topics.first() == Some(&topic),
                None => true,
            }
    }

    /// Split the range into consecutive chunks of at most `max_range` blocks.
    pub fn chunks(&self, max_range: u64) -> Vec<LogFilter> {
        let max_range = max_range.max(1);
        let mut out = Vec::new();
        let mut start = self.from_block;
        while start <= self.to_block {
            let end = start.saturating_add(max_range - 1).min(self.to_block);
            out.push(LogFilter {
                from_block: start,
                to_block: end,
                ..self.clone()
            });
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        out
    }
}

// ─── Blocks / receipts ────────────────────────────────────────────────────────

/// The parts of a block header the watcher needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub hash: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

impl BlockInfo {
    /// Block timestamp in milliseconds.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.saturating_mul(1000)
    }
}

/// Outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    /// `None` while the transaction is still pending.
    pub block_number: Option<u64>,
    /// `false` only if the transaction is known to have reverted.
    pub status: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(from: u64, to: u64) -> LogFilter {
        LogFilter {
            address: "0xaa".into(),
            topic0: None,
            from_block: from,
            to_block: to,
        }
    }

    #[test]
    fn chunks_cover_range_without_overlap() {
        let chunks = filter(10, 34).chunks(10);
        let ranges: Vec<_> = chunks.iter().map(|c| (c.from_block, c.to_block)).collect();
        assert_eq!(ranges, vec![(10, 19), (20, 29), (30, 34)]);
    }

    #[test]
    fn single_chunk_when_range_is_small() {
        let chunks = filter(5, 5).chunks(1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].from_block, 5);
    }

    #[test]
    fn filter_matches_address_case_insensitively() {
        let log = RawLog {
            address: "0xAA".into(),
            topics: vec![],
            data: Bytes::new(),
            block_number: 7,
            log_index: 0,
            tx_hash: "0x0".into(),
            removed: false,
        };
        assert!(filter(0, 10).matches(&log));
        assert!(!filter(8, 10).matches(&log));
    }

    #[test]
    fn timestamp_converted_to_millis() {
        let block = BlockInfo { number: 1, hash: "0x1".into(), timestamp: 1_500_000_000 };
        assert_eq!(block.timestamp_ms(), 1_500_000_000_000);
    }
}
