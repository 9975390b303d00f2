//! Contract handle resolution.
//!
//! A [`ContractHandle`] binds a [`ContractDescriptor`] to one deployed
//! instance. Resolution runs at most once; every clone of the handle and
//! every concurrent [`ContractHandle::wait`] shares the settled outcome.
//!
//! ```text
//! Pending ──bind ok──▶ Ready(BoundContract)
//!    └─────bind err──▶ Failed(DaoError)
//! ```
//!
//! Neither `Ready` nor `Failed` is ever left; a failed handle is not retried.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::address::ensure_valid_address;
use crate::config::{BindStrategy, ResolverConfig};
use crate::descriptor::ContractDescriptor;
use crate::error::DaoError;
use crate::transport::TransportHandle;

/// Which instance of a contract to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentTarget {
    /// A fixed address.
    Address(String),
    /// The deployment recorded in the descriptor for the connected network.
    Latest,
}

impl DeploymentTarget {
    /// `Some(address)` → fixed address, `None` → latest deployment.
    pub fn from_option(at: Option<&str>) -> Self {
        match at {
            Some(a) => Self::Address(a.to_string()),
            None => Self::Latest,
        }
    }
}

/// A descriptor bound to a confirmed deployment.
#[derive(Debug, Clone)]
pub struct BoundContract {
    descriptor: Arc<ContractDescriptor>,
    address: String,
}

impl BoundContract {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn descriptor(&self) -> &ContractDescriptor {
        &self.descriptor
    }
}

/// Snapshot of a handle's resolution.
#[derive(Debug, Clone)]
pub enum HandleState {
    Pending,
    Ready(BoundContract),
    Failed(DaoError),
}

impl HandleState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

type Resolution = Shared<BoxFuture<'static, Result<BoundContract, DaoError>>>;

/// A settle-once, shareable contract binding.
#[derive(Clone)]
pub struct ContractHandle {
    descriptor: Arc<ContractDescriptor>,
    resolution: Resolution,
}

impl ContractHandle {
    /// Bind `descriptor` to a fixed `address`.
    ///
    /// A malformed address settles the handle as `Failed` immediately,
    /// without touching the transport.
    pub fn resolve_by_address(
        descriptor: Arc<ContractDescriptor>,
        address: &str,
        transport: TransportHandle,
        config: &ResolverConfig,
    ) -> Self {
        Self::resolve(
            descriptor,
            DeploymentTarget::Address(address.to_string()),
            transport,
            config,
        )
    }

    /// Bind `descriptor` to its deployment on the connected network.
    pub fn resolve_latest_deployment(
        descriptor: Arc<ContractDescriptor>,
        transport: TransportHandle,
        config: &ResolverConfig,
    ) -> Self {
        Self::resolve(descriptor, DeploymentTarget::Latest, transport, config)
    }

    /// Start resolving `target`.
    ///
    /// With [`BindStrategy::Deferred`] the work starts on a background task
    /// right away (falling back to on-demand resolution outside a Tokio
    /// runtime). With [`BindStrategy::Direct`] it starts when the handle is
    /// first awaited.
    pub fn resolve(
        descriptor: Arc<ContractDescriptor>,
        target: DeploymentTarget,
        transport: TransportHandle,
        config: &ResolverConfig,
    ) -> Self {
        let binder = Binder {
            descriptor: descriptor.clone(),
            transport,
            config: config.clone(),
        };

        if let DeploymentTarget::Address(address) = &target {
            if let Err(e) = ensure_valid_address(address) {
                tracing::error!(
                    contract = %descriptor.name(),
                    %address,
                    "invalid contract address"
                );
                let failed = futures::future::ready(Err(e)).boxed().shared();
                // settle now so `state()` reports Failed before anyone awaits
                let _ = failed.clone().now_or_never();
                return Self {
                    descriptor,
                    resolution: failed,
                };
            }
        }

        let resolution = binder.run(target).boxed().shared();

        if config.strategy == BindStrategy::Deferred {
            if let Ok(rt) = tokio::runtime::Handle::try_current() {
                rt.spawn(resolution.clone());
            }
        }

        Self {
            descriptor,
            resolution,
        }
    }

    /// Wait for the handle to settle.
    ///
    /// Safe to call from any number of tasks, before or after settlement;
    /// none of them triggers a second resolution.
    pub async fn wait(&self) -> Result<BoundContract, DaoError> {
        self.resolution.clone().await
    }

    /// Current state without waiting.
    pub fn state(&self) -> HandleState {
        match self.resolution.peek() {
            None => HandleState::Pending,
            Some(Ok(bound)) => HandleState::Ready(bound.clone()),
            Some(Err(e)) => HandleState::Failed(e.clone()),
        }
    }

    pub fn descriptor(&self) -> &Arc<ContractDescriptor> {
        &self.descriptor
    }
}

impl fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractHandle")
            .field("contract", &self.descriptor.name())
            .field("state", &self.state())
            .finish()
    }
}

// ─── Resolution ───────────────────────────────────────────────────────────────

struct Binder {
    descriptor: Arc<ContractDescriptor>,
    transport: TransportHandle,
    config: ResolverConfig,
}

impl Binder {
    async fn run(self, target: DeploymentTarget) -> Result<BoundContract, DaoError> {
        let contract = self.descriptor.name().to_string();
        let result = self.bind(target).await;
        match &result {
            Ok(bound) => {
                tracing::info!(%contract, address = %bound.address, "contract handle ready")
            }
            Err(e) => tracing::error!(%contract, error = %e, "contract handle failed"),
        }
        result
    }

    async fn bind(&self, target: DeploymentTarget) -> Result<BoundContract, DaoError> {
        let address = match target {
            DeploymentTarget::Address(address) => address,
            DeploymentTarget::Latest => {
                let network = self.transport.network_id().await?;
                let address = self.descriptor.deployment(&network).ok_or_else(|| {
                    DaoError::DeploymentNotFound {
                        contract: self.descriptor.name().to_string(),
                        reason: format!("no deployment recorded for network {network}"),
                    }
                })?;
                ensure_valid_address(address)?.to_string()
            }
        };

        self.wait_for_code(&address).await?;

        Ok(BoundContract {
            descriptor: self.descriptor.clone(),
            address,
        })
    }

    /// Poll until contract code is visible at `address`.
    async fn wait_for_code(&self, address: &str) -> Result<(), DaoError> {
        let deadline = Instant::now() + self.config.timeout();
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let code = self.transport.code_at(address).await?;
            if !code.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DaoError::DeploymentNotFound {
                    contract: self.descriptor.name().to_string(),
                    reason: format!(
                        "no contract code at {address} after {}ms",
                        self.config.confirmation_timeout_ms
                    ),
                });
            }
            tracing::debug!(
                contract = %self.descriptor.name(),
                %address,
                "waiting for deployment confirmation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::time::Duration;

    const ADDR: &str = "0x1111111111111111111111111111111111111111";

    fn descriptor() -> Arc<ContractDescriptor> {
        Arc::new(
            ContractDescriptor::from_abi_json("Token", "[]")
                .unwrap()
                .with_deployment("5", ADDR),
        )
    }

    fn setup() -> (Arc<MockTransport>, TransportHandle) {
        let mock = Arc::new(MockTransport::new("5"));
        let handle = TransportHandle::from_arc(mock.clone());
        (mock, handle)
    }

    #[tokio::test]
    async fn resolves_fixed_address() {
        let (mock, transport) = setup();
        mock.deploy(ADDR);
        let config = ResolverConfig::default();
        let handle = ContractHandle::resolve_by_address(descriptor(), ADDR, transport, &config);
        let bound = handle.wait().await.unwrap();
        assert_eq!(bound.address(), ADDR);
        assert!(matches!(handle.state(), HandleState::Ready(_)));
    }

    #[tokio::test]
    async fn invalid_address_fails_without_io() {
        let (mock, transport) = setup();
        let config = ResolverConfig::default();
        let handle = ContractHandle::resolve_by_address(descriptor(), "0xnope", transport, &config);
        assert!(matches!(handle.state(), HandleState::Failed(DaoError::InvalidAddress { .. })));
        assert!(matches!(handle.wait().await, Err(DaoError::InvalidAddress { .. })));
        assert_eq!(mock.code_lookups(), 0);
        assert_eq!(mock.network_lookups(), 0);
    }

    #[tokio::test]
    async fn latest_deployment_uses_network_id() {
        let (mock, transport) = setup();
        mock.deploy(ADDR);
        let config = ResolverConfig::default();
        let handle = ContractHandle::resolve_latest_deployment(descriptor(), transport, &config);
        assert_eq!(handle.wait().await.unwrap().address(), ADDR);
        assert_eq!(mock.network_lookups(), 1);
    }

    #[tokio::test]
    async fn latest_deployment_missing_for_network() {
        let mock = Arc::new(MockTransport::new("99"));
        let transport = TransportHandle::from_arc(mock.clone());
        let config = ResolverConfig::default();
        let handle = ContractHandle::resolve_latest_deployment(descriptor(), transport, &config);
        assert!(matches!(handle.wait().await, Err(DaoError::DeploymentNotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_code_is_confirmed() {
        let (mock, transport) = setup();
        mock.deploy_after(ADDR, 3);
        let config = ResolverConfig::default();
        let handle = ContractHandle::resolve_by_address(descriptor(), ADDR, transport, &config);
        handle.wait().await.unwrap();
        assert_eq!(mock.code_lookups(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_confirmation_timeout() {
        let (_mock, transport) = setup();
        let config = ResolverConfig {
            confirmation_timeout_ms: 200,
            ..Default::default()
        };
        let handle = ContractHandle::resolve_by_address(descriptor(), ADDR, transport, &config);
        assert!(matches!(handle.wait().await, Err(DaoError::DeploymentNotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_share_one_resolution() {
        let (mock, transport) = setup();
        mock.deploy(ADDR);
        mock.set_code_delay(Duration::from_millis(500));
        for strategy in [BindStrategy::Deferred, BindStrategy::Direct] {
            let before = mock.code_lookups();
            let config = ResolverConfig { strategy, ..Default::default() };
            let handle =
                ContractHandle::resolve_by_address(descriptor(), ADDR, transport.clone(), &config);
            let other = handle.clone();
            let (a, b) = tokio::join!(handle.wait(), other.wait());
            assert_eq!(a.unwrap().address(), b.unwrap().address());
            assert_eq!(mock.code_lookups() - before, 1, "{strategy:?}");
        }
    }

    #[tokio::test]
    async fn failure_is_sticky_and_not_retried() {
        let (mock, transport) = setup();
        mock.fail_code_lookups("connection refused");
        let config = ResolverConfig::default();
        let handle = ContractHandle::resolve_by_address(descriptor(), ADDR, transport, &config);
        let first = handle.wait().await.unwrap_err();
        let second = handle.wait().await.unwrap_err();
        assert_eq!(first, DaoError::Transport("connection refused".into()));
        assert_eq!(first, second);
        assert_eq!(mock.code_lookups(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_strategy_resolves_without_a_waiter() {
        let (mock, transport) = setup();
        mock.deploy(ADDR);
        let config = ResolverConfig { strategy: BindStrategy::Deferred, ..Default::default() };
        let handle = ContractHandle::resolve_by_address(descriptor(), ADDR, transport, &config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(handle.state(), HandleState::Ready(_)));
        assert_eq!(mock.code_lookups(), 1);
    }

    #[tokio::test]
    async fn direct_strategy_waits_for_first_caller() {
        let (mock, transport) = setup();
        mock.deploy(ADDR);
        let config = ResolverConfig { strategy: BindStrategy::Direct, ..Default::default() };
        let handle = ContractHandle::resolve_by_address(descriptor(), ADDR, transport, &config);
        tokio::task::yield_now().await;
        assert!(handle.state().is_pending());
        assert_eq!(mock.code_lookups(), 0);
        handle.wait().await.unwrap();
        assert_eq!(mock.code_lookups(), 1);
    }
}
