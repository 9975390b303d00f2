//! Base contract operations built on a resolved [`ContractHandle`].
//!
//! Every operation awaits the handle first, so callers never need to order
//! their calls against resolution.

use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use async_trait::async_trait;

use crate::abi;
use crate::address;
use crate::config::ResolverConfig;
use crate::descriptor::ContractDescriptor;
use crate::error::DaoError;
use crate::handle::{BoundContract, ContractHandle, DeploymentTarget};
use crate::transport::TransportHandle;
use crate::types::TxReceipt;

/// A contract handle plus the transport used to talk to it.
#[derive(Debug, Clone)]
pub struct ContractDao {
    handle: ContractHandle,
    transport: TransportHandle,
}

impl ContractDao {
    /// Start resolving `descriptor`.
    ///
    /// `at = None` binds the latest deployment recorded for the connected
    /// network; `config.strategy` selects deferred or direct binding.
    pub fn new(
        descriptor: Arc<ContractDescriptor>,
        at: Option<&str>,
        transport: TransportHandle,
        config: &ResolverConfig,
    ) -> Self {
        let handle = ContractHandle::resolve(
            descriptor,
            DeploymentTarget::from_option(at),
            transport.clone(),
            config,
        );
        Self { handle, transport }
    }

    pub fn handle(&self) -> &ContractHandle {
        &self.handle
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    pub fn descriptor(&self) -> &ContractDescriptor {
        self.handle.descriptor()
    }

    /// Wait for the binding.
    pub async fn bound(&self) -> Result<BoundContract, DaoError> {
        self.handle.wait().await
    }

    /// Address of the bound instance.
    pub async fn get_address(&self) -> Result<String, DaoError> {
        Ok(self.bound().await?.address().to_string())
    }

    /// Read-only call of `function`, returning all outputs.
    pub async fn call(
        &self,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, DaoError> {
        let bound = self.bound().await?;
        let func = bound.descriptor().function(function)?;
        let data = abi::encode_call(func, args)?;
        let ret = self.transport.call(bound.address(), data).await?;
        abi::decode_output(func, &ret)
    }

    /// Read-only call of a single-output function.
    pub async fn call_single(
        &self,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<DynSolValue, DaoError> {
        self.call(function, args).await?.into_iter().next().ok_or_else(|| {
            DaoError::Abi(format!("'{function}' returned no values"))
        })
    }

    /// Submit a transaction invoking `function`.
    pub async fn send(&self, function: &str, args: &[DynSolValue]) -> Result<TxReceipt, DaoError> {
        let bound = self.bound().await?;
        let func = bound.descriptor().function(function)?;
        let data = abi::encode_call(func, args)?;
        let receipt = self.transport.send_transaction(bound.address(), data).await?;
        tracing::info!(
            contract = %bound.descriptor().name(),
            function,
            tx = %receipt.tx_hash,
            "transaction submitted"
        );
        Ok(receipt)
    }

    /// `true` if the bound address currently holds contract code.
    pub async fn has_code(&self) -> Result<bool, DaoError> {
        let bound = self.bound().await?;
        Ok(!self.transport.code_at(bound.address()).await?.is_empty())
    }

    /// See [`decode_fixed_string`].
    pub fn decode_fixed_string(&self, raw: &[u8]) -> String {
        decode_fixed_string(raw)
    }

    /// See [`address::is_empty_address`].
    pub fn is_empty_address(&self, address: &str) -> bool {
        address::is_empty_address(address)
    }
}

/// Decode a fixed-width binary field (e.g. `bytes32`) into text,
/// dropping the trailing NUL padding.
pub fn decode_fixed_string(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// [`decode_fixed_string`] for `0x`-prefixed hex input.
pub fn decode_fixed_string_hex(hex_str: &str) -> Result<String, DaoError> {
    let raw = hex::decode(hex_str.strip_prefix("0x").unwrap_or(hex_str))
        .map_err(|e| DaoError::Abi(format!("invalid hex {hex_str:?}: {e}")))?;
    Ok(decode_fixed_string(&raw))
}

// ─── Contract kinds ───────────────────────────────────────────────────────────

/// Capability every concrete contract kind implements.
///
/// `check_validity` has no default: a kind that cannot say whether its
/// bound address really is that contract does not compile.
#[async_trait]
pub trait ContractBinding: Send + Sync {
    fn dao(&self) -> &ContractDao;

    /// On-chain check that the bound address implements this contract.
    async fn check_validity(&self) -> Result<bool, DaoError>;

    async fn address(&self) -> Result<String, DaoError> {
        self.dao().get_address().await
    }
}

/// A contract known only by its descriptor.
///
/// Useful for ad-hoc reads and watches; it has no validity check and
/// reports [`DaoError::NotImplemented`] when asked for one.
#[derive(Debug, Clone)]
pub struct GenericContract {
    dao: ContractDao,
}

impl GenericContract {
    pub fn new(dao: ContractDao) -> Self {
        Self { dao }
    }
}

#[async_trait]
impl ContractBinding for GenericContract {
    fn dao(&self) -> &ContractDao {
        &self.dao
    }

    async fn check_validity(&self) -> Result<bool, DaoError> {
        Err(DaoError::NotImplemented {
            contract: self.dao.descriptor().name().to_string(),
            operation: "check_validity".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use alloy_primitives::U256;

    const ADDR: &str = "0x2222222222222222222222222222222222222222";
    const ABI: &str = r#"[
        {"type":"function","name":"counter","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"setCounter","inputs":[{"name":"v","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"}
    ]"#;

    fn dao(mock: &Arc<MockTransport>, at: Option<&str>) -> ContractDao {
        let descriptor = Arc::new(
            ContractDescriptor::from_abi_json("Counter", ABI)
                .unwrap()
                .with_deployment("5", ADDR),
        );
        let transport = TransportHandle::from_arc(mock.clone());
        ContractDao::new(descriptor, at, transport, &ResolverConfig::default())
    }

    #[test]
    fn fixed_string_strips_trailing_nul() {
        assert_eq!(decode_fixed_string(b"LocX\0\0\0\0"), "LocX");
        assert_eq!(decode_fixed_string(&[0u8; 32]), "");
        assert_eq!(decode_fixed_string(b"abc"), "abc");
        assert_eq!(decode_fixed_string_hex("0x4c6f635800000000").unwrap(), "LocX");
        assert!(decode_fixed_string_hex("0xzz").is_err());
    }

    #[tokio::test]
    async fn address_and_reads_wait_for_resolution() {
        let mock = Arc::new(MockTransport::new("5"));
        mock.deploy(ADDR);
        let dao = dao(&mock, None);
        let func = dao.descriptor().function("counter").unwrap().clone();
        mock.respond(ADDR, &func, vec![DynSolValue::Uint(U256::from(7u64), 256)]);

        assert_eq!(dao.get_address().await.unwrap(), ADDR);
        let v = dao.call_single("counter", &[]).await.unwrap();
        assert_eq!(abi::as_uint(&v).unwrap(), U256::from(7u64));
        assert!(dao.has_code().await.unwrap());
    }

    #[tokio::test]
    async fn send_encodes_calldata() {
        let mock = Arc::new(MockTransport::new("5"));
        mock.deploy(ADDR);
        let dao = dao(&mock, Some(ADDR));
        let receipt = dao
            .send("setCounter", &[DynSolValue::Uint(U256::from(9u64), 256)])
            .await
            .unwrap();
        assert!(receipt.status);
        let sent = mock.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ADDR);
        assert_eq!(sent[0].1.len(), 4 + 32);
    }

    #[tokio::test]
    async fn operations_on_failed_handle_propagate_error() {
        let mock = Arc::new(MockTransport::new("5"));
        let dao = dao(&mock, Some("not-an-address"));
        assert!(matches!(dao.get_address().await, Err(DaoError::InvalidAddress { .. })));
        assert!(matches!(dao.call("counter", &[]).await, Err(DaoError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn generic_contract_validity_is_not_implemented() {
        let mock = Arc::new(MockTransport::new("5"));
        mock.deploy(ADDR);
        let contract = GenericContract::new(dao(&mock, Some(ADDR)));
        assert_eq!(contract.address().await.unwrap(), ADDR);
        assert!(matches!(
            contract.check_validity().await,
            Err(DaoError::NotImplemented { .. })
        ));
    }

    #[test]
    fn empty_address_helper() {
        let mock = Arc::new(MockTransport::new("5"));
        let dao = dao(&mock, Some(ADDR));
        assert!(dao.is_empty_address(crate::address::ZERO_ADDRESS));
        assert!(!dao.is_empty_address(ADDR));
    }
}
