//! Event watch manager. Polls contract logs from a durable cursor and fans
//! them out to registered handlers.
//!
//! # Lifecycle of one subscription
//!
//! ```text
//! Starting ──▶ Active ──▶ Stopped
//! ```
//!
//! - **Starting**: the contract handle is awaited and the first block is
//!   chosen: persisted cursor + 1, or the current chain height.
//! - **Active**: each round walks `[next, latest]` in chunks of at most
//!   `max_block_range` blocks. A chunk's entries are delivered in
//!   `(block, log_index)` order, and the cursor advances once all entries of a
//!   block have been delivered and again at the end of the chunk. Entries the
//!   node returns outside the requested range are dropped. Delivery is at-least-once: a crash between a
//!   delivery and the cursor write redelivers that block after restart, so
//!   handlers should be idempotent on `(block_number, log_index)`.
//! - **Stopped**: via [`WatchSubscription::stop`], an `ErrorAction::Stop`
//!   from the handler, or [`WatchManager::stop_all`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy_json_abi::Event;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::abi::{self, DecodedLog};
use crate::config::WatchConfig;
use crate::contract::ContractDao;
use crate::cursor::WatchCursor;
use crate::error::DaoError;
use crate::retry::RetryPolicy;
use crate::storage::KeyValueStore;
use crate::transport::TransportHandle;
use crate::types::{LogFilter, RawLog};

// ─── Events and handlers ──────────────────────────────────────────────────────

/// One delivered log entry.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// Id of the subscription that delivered it.
    pub subscription: u64,
    pub payload: DecodedLog,
    pub address: String,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: String,
    /// Block timestamp in milliseconds.
    pub timestamp_ms: i64,
}

/// What a subscription does after a failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Back off and poll again.
    Retry,
    /// Stop this subscription only.
    Stop,
}

/// Receives the events (and errors) of one subscription.
#[async_trait]
pub trait WatchHandler: Send + Sync + 'static {
    /// Called for each entry, in chain order. Returning an error leaves the
    /// cursor where it was, so the entry's block is delivered again.
    async fn on_event(&self, event: &WatchEvent) -> Result<(), DaoError>;

    /// Called with a [`DaoError::Subscription`] when a poll fails.
    async fn on_error(&self, error: &DaoError) -> ErrorAction {
        tracing::warn!(%error, "watch poll failed; retrying");
        ErrorAction::Retry
    }
}

#[async_trait]
impl<F> WatchHandler for F
where
    F: Fn(&WatchEvent) + Send + Sync + 'static,
{
    async fn on_event(&self, event: &WatchEvent) -> Result<(), DaoError> {
        self(event);
        Ok(())
    }
}

// ─── Subscription ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Starting,
    Active,
    Stopped,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// One registered interest in an event stream.
pub struct WatchSubscription {
    id: u64,
    event: String,
    address: String,
    from_block: u64,
    state: Mutex<SubscriptionState>,
    stop: watch::Sender<bool>,
}

impl WatchSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// First block this subscription queried.
    pub fn from_block(&self) -> u64 {
        self.from_block
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.lock().unwrap()
    }

    /// Ask this subscription to stop. No-op if it already has.
    ///
    /// No callback starts after this returns; one already running finishes.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    fn set_state(&self, state: SubscriptionState) {
        *self.state.lock().unwrap() = state;
    }
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("from_block", &self.from_block)
            .field("state", &self.state())
            .finish()
    }
}

struct Registered {
    subscription: Arc<WatchSubscription>,
    task: JoinHandle<()>,
}

// ─── Manager ──────────────────────────────────────────────────────────────────

/// Owns every active subscription and the cursor they share.
pub struct WatchManager {
    cursor: Arc<WatchCursor>,
    config: WatchConfig,
    registry: Mutex<Vec<Registered>>,
    next_id: AtomicU64,
}

impl WatchManager {
    pub fn new(store: Arc<dyn KeyValueStore>, config: WatchConfig) -> Self {
        let cursor = Arc::new(WatchCursor::new(store, config.cursor_key.clone()));
        Self {
            cursor,
            config,
            registry: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn cursor(&self) -> &WatchCursor {
        &self.cursor
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Watch `event` on `contract`, delivering entries to `handler`.
    ///
    /// Waits for the contract handle; resolution errors, unknown events and
    /// failures choosing the start block are returned here.
    pub async fn watch<H: WatchHandler>(
        &self,
        contract: &ContractDao,
        event: &str,
        handler: H,
    ) -> Result<Arc<WatchSubscription>, DaoError> {
        let bound = contract.bound().await?;
        let abi_event = bound.descriptor().event(event)?.clone();
        let transport = contract.transport().clone();

        let from_block = match self.cursor.next_block().await? {
            Some(next) => next,
            None => transport.current_block_height().await?,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (stop, stop_rx) = watch::channel(false);
        let subscription = Arc::new(WatchSubscription {
            id,
            event: event.to_string(),
            address: bound.address().to_string(),
            from_block,
            state: Mutex::new(SubscriptionState::Starting),
            stop,
        });

        let poller = Poller {
            subscription: subscription.clone(),
            event: abi_event,
            transport,
            cursor: self.cursor.clone(),
            handler: Arc::new(handler),
            config: self.config.clone(),
            retry: RetryPolicy::new(self.config.retry.clone()),
        };
        let task = tokio::spawn(poller.run(from_block, stop_rx));

        tracing::info!(
            id,
            event,
            address = %subscription.address,
            from_block,
            "watch started"
        );

        self.registry.lock().unwrap().push(Registered {
            subscription: subscription.clone(),
            task,
        });
        Ok(subscription)
    }

    /// Number of registered subscriptions (including individually stopped ones).
    pub fn len(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscriptions that have not stopped.
    pub fn active_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.subscription.state() != SubscriptionState::Stopped)
            .count()
    }

    /// Stop every subscription and clear the registry.
    ///
    /// Waits for each subscription's task to finish, so no callback fires
    /// after this returns. Already stopped or failing subscriptions are
    /// simply reaped. Returns the number of subscriptions removed.
    pub async fn stop_all(&self) -> usize {
        let entries = std::mem::take(&mut *self.registry.lock().unwrap());
        let count = entries.len();
        for entry in &entries {
            entry.subscription.stop();
        }
        for entry in entries {
            if let Err(e) = entry.task.await {
                let id = entry.subscription.id;
                tracing::warn!(id, error = %e, "watch task ended abnormally");
            }
        }
        if count > 0 {
            tracing::info!(count, "stopped all watches");
        }
        count
    }
}

impl fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchManager")
            .field("cursor_key", &self.cursor.key())
            .field("subscriptions", &self.len())
            .finish()
    }
}

// ─── Poll loop ────────────────────────────────────────────────────────────────

struct Poller {
    subscription: Arc<WatchSubscription>,
    event: Event,
    transport: TransportHandle,
    cursor: Arc<WatchCursor>,
    handler: Arc<dyn WatchHandler>,
    config: WatchConfig,
    retry: RetryPolicy,
}

/// Result of one poll round.
enum Round {
    Delivered(usize),
    Stopped,
}

impl Poller {
    async fn run(self, from_block: u64, mut stop: watch::Receiver<bool>) {
        let id = self.subscription.id;
        let mut next = from_block;
        let mut failures = 0u32;
        self.subscription.set_state(SubscriptionState::Active);

        loop {
            let delay = match self.poll(&mut next, &mut stop).await {
                Ok(Round::Stopped) => break,
                Ok(Round::Delivered(count)) => {
                    if count > 0 {
                        tracing::debug!(id, delivered = count, next, "watch round delivered");
                    }
                    failures = 0;
                    self.config.poll_interval()
                }
                Err(e) => {
                    failures += 1;
                    let error = DaoError::Subscription {
                        id,
                        reason: e.to_string(),
                    };
                    if self.handler.on_error(&error).await == ErrorAction::Stop {
                        tracing::info!(id, "watch stopped by its handler");
                        break;
                    }
                    match self.retry.next_delay(failures) {
                        Some(delay) => {
                            tracing::warn!(
                                id,
                                attempt = failures,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "watch poll failed"
                            );
                            delay
                        }
                        None => {
                            let attempt = failures;
                            tracing::error!(id, attempt, error = %e, "watch retries exhausted");
                            break;
                        }
                    }
                }
            };

            if sleep_or_stop(delay, &mut stop).await {
                break;
            }
        }

        self.subscription.set_state(SubscriptionState::Stopped);
        tracing::info!(id, event = %self.subscription.event, "watch stopped");
    }

    async fn poll(
        &self,
        next: &mut u64,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Round, DaoError> {
        let height = self.transport.current_block_height();
        let Some(latest) = unless_stopped(stop, height).await? else {
            return Ok(Round::Stopped);
        };
        if *next > latest {
            return Ok(Round::Delivered(0));
        }

        let filter = LogFilter {
            address: self.subscription.address.clone(),
            topic0: (!self.event.anonymous).then(|| abi::event_topic(&self.event)),
            from_block: *next,
            to_block: latest,
        };

        // Each chunk is delivered and checkpointed before the next is fetched.
        let mut timestamps: HashMap<u64, i64> = HashMap::new();
        let mut delivered = 0;
        for chunk in filter.chunks(self.config.max_block_range) {
            let Some(mut logs) = unless_stopped(stop, self.transport.query_logs(&chunk)).await?
            else {
                return Ok(Round::Stopped);
            };
            self.retain_in_range(&chunk, &mut logs);

            tracing::debug!(
                id = self.subscription.id,
                from = chunk.from_block,
                to = chunk.to_block,
                logs = logs.len(),
                "watch poll chunk"
            );

            for block_logs in logs.chunk_by(|a, b| a.block_number == b.block_number) {
                let block_number = block_logs[0].block_number;
                match self.deliver_block(block_logs, &mut timestamps, stop).await? {
                    Some(n) => delivered += n,
                    None => return Ok(Round::Stopped),
                }
                self.cursor.advance(block_number).await?;
                *next = block_number + 1;
            }

            self.cursor.advance(chunk.to_block).await?;
            *next = chunk.to_block.saturating_add(1);
        }

        Ok(Round::Delivered(delivered))
    }

    /// Drop removed logs and logs outside `chunk`'s block range, then order
    /// the rest by chain position without duplicates.
    fn retain_in_range(&self, chunk: &LogFilter, logs: &mut Vec<RawLog>) {
        let range = chunk.from_block..=chunk.to_block;
        logs.retain(|l| {
            if l.removed {
                return false;
            }
            if range.contains(&l.block_number) {
                return true;
            }
            tracing::warn!(
                id = self.subscription.id,
                block = l.block_number,
                log_index = l.log_index,
                from = chunk.from_block,
                to = chunk.to_block,
                "dropping log outside the requested range"
            );
            false
        });
        logs.sort_by_key(RawLog::position);
        logs.dedup_by_key(|l| l.position());
    }

    /// Deliver the logs of one block; `None` means the watch was stopped.
    async fn deliver_block(
        &self,
        block_logs: &[RawLog],
        timestamps: &mut HashMap<u64, i64>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<usize>, DaoError> {
        let block_number = block_logs[0].block_number;
        let timestamp_ms = match timestamps.get(&block_number) {
            Some(ts) => *ts,
            None => {
                let block = self.transport.get_block(block_number);
                let Some(block) = unless_stopped(stop, block).await? else {
                    return Ok(None);
                };
                let ts = block
                    .ok_or_else(|| DaoError::Transport(format!("block {block_number} not found")))?
                    .timestamp_ms();
                timestamps.insert(block_number, ts);
                ts
            }
        };

        let mut delivered = 0;
        for log in block_logs {
            if *stop.borrow() {
                return Ok(None);
            }
            let payload = match abi::decode_log(&self.event, log) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(
                        id = self.subscription.id,
                        block = log.block_number,
                        log_index = log.log_index,
                        error = %e,
                        "skipping undecodable log"
                    );
                    continue;
                }
            };
            let event = WatchEvent {
                subscription: self.subscription.id,
                payload,
                address: log.address.clone(),
                block_number: log.block_number,
                log_index: log.log_index,
                tx_hash: log.tx_hash.clone(),
                timestamp_ms,
            };
            self.handler.on_event(&event).await?;
            delivered += 1;
        }
        Ok(Some(delivered))
    }
}

/// Run `fut` unless the stop flag is (or becomes) set; `Ok(None)` means stopped.
async fn unless_stopped<T, F>(
    stop: &mut watch::Receiver<bool>,
    fut: F,
) -> Result<Option<T>, DaoError>
where
    F: Future<Output = Result<T, DaoError>>,
{
    if *stop.borrow() {
        return Ok(None);
    }
    tokio::select! {
        res = fut => res.map(Some),
        _ = stop.changed() => Ok(None),
    }
}

/// Sleep for `delay`; returns `true` if a stop was requested meanwhile.
async fn sleep_or_stop(delay: std::time::Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => *stop.borrow(),
        res = stop.changed() => res.is_err() || *stop.borrow(),
    }
}
