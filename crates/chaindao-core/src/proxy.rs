//! Operations shared by versioned / upgradeable proxy contracts.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use crate::abi;
use crate::address::ensure_valid_address;
use crate::contract::{ContractBinding, ContractDao};
use crate::error::DaoError;

/// Functions a proxy contract's ABI must declare.
pub const PROXY_FUNCTIONS: &[&str] =
    &["getLatestVersion", "name", "symbol", "totalSupply", "balanceOf"];

/// Read operations of an upgradeable token proxy.
///
/// Implemented by marking a [`ContractBinding`] kind with `impl ProxyContract for Kind {}`.
#[async_trait]
pub trait ProxyContract: ContractBinding {
    /// Address of the implementation currently behind the proxy.
    async fn get_latest_version(&self) -> Result<String, DaoError> {
        abi::as_address(&self.dao().call_single("getLatestVersion", &[]).await?)
    }

    async fn get_name(&self) -> Result<String, DaoError> {
        abi::as_string(&self.dao().call_single("name", &[]).await?)
    }

    async fn get_symbol(&self) -> Result<String, DaoError> {
        abi::as_string(&self.dao().call_single("symbol", &[]).await?)
    }

    /// Total supply as a native integer.
    async fn get_total_supply(&self) -> Result<u128, DaoError> {
        let raw = abi::as_uint(&self.dao().call_single("totalSupply", &[]).await?)?;
        u128::try_from(raw).map_err(|_| DaoError::NumericOverflow {
            value: raw.to_string(),
            target: "u128",
        })
    }

    /// Raw balance of `account`, full precision.
    async fn get_account_balance(&self, account: &str) -> Result<U256, DaoError> {
        let account: Address = ensure_valid_address(account)?
            .parse()
            .map_err(|_| DaoError::InvalidAddress { address: account.to_string() })?;
        abi::as_uint(
            &self
                .dao()
                .call_single("balanceOf", &[DynSolValue::Address(account)])
                .await?,
        )
    }
}

/// A ChronoBank-style asset proxy (e.g. the LHT token).
#[derive(Debug, Clone)]
pub struct AssetProxyDao {
    dao: ContractDao,
}

impl AssetProxyDao {
    pub fn new(dao: ContractDao) -> Self {
        Self { dao }
    }
}

#[async_trait]
impl ContractBinding for AssetProxyDao {
    fn dao(&self) -> &ContractDao {
        &self.dao
    }

    /// Code must exist at the bound address and it must answer `symbol()`
    /// with a non-empty value.
    async fn check_validity(&self) -> Result<bool, DaoError> {
        if !self.dao.descriptor().implements(PROXY_FUNCTIONS) || !self.dao.has_code().await? {
            return Ok(false);
        }
        match self.get_symbol().await {
            Ok(symbol) => Ok(!symbol.is_empty()),
            Err(DaoError::Transport(_)) | Err(DaoError::Abi(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl ProxyContract for AssetProxyDao {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::descriptor::ContractDescriptor;
    use crate::mock::MockTransport;
    use crate::transport::TransportHandle;
    use std::sync::Arc;

    const PROXY: &str = "0x3333333333333333333333333333333333333333";
    const ABI: &str = r#"[
        {"type":"function","name":"getLatestVersion","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"},
        {"type":"function","name":"name","inputs":[],"outputs":[{"name":"","type":"string"}],"stateMutability":"view"},
        {"type":"function","name":"symbol","inputs":[],"outputs":[{"name":"","type":"string"}],"stateMutability":"view"},
        {"type":"function","name":"totalSupply","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}
    ]"#;

    fn setup() -> (Arc<MockTransport>, AssetProxyDao) {
        let mock = Arc::new(MockTransport::new("5"));
        mock.deploy(PROXY);
        let descriptor =
            Arc::new(ContractDescriptor::from_abi_json("ChronoBankAssetProxy", ABI).unwrap());
        let dao = ContractDao::new(
            descriptor,
            Some(PROXY),
            TransportHandle::from_arc(mock.clone()),
            &ResolverConfig::default(),
        );
        (mock, AssetProxyDao::new(dao))
    }

    fn respond(mock: &MockTransport, proxy: &AssetProxyDao, name: &str, outputs: Vec<DynSolValue>) {
        let func = proxy.dao().descriptor().function(name).unwrap().clone();
        mock.respond(PROXY, &func, outputs);
    }

    #[tokio::test]
    async fn pass_through_reads() {
        let (mock, proxy) = setup();
        let latest = Address::repeat_byte(0x44);
        respond(&mock, &proxy, "getLatestVersion", vec![DynSolValue::Address(latest)]);
        respond(&mock, &proxy, "name", vec![DynSolValue::String("Labour Hour Token".into())]);
        respond(&mock, &proxy, "symbol", vec![DynSolValue::String("LHT".into())]);

        assert_eq!(proxy.get_latest_version().await.unwrap(), latest.to_checksum(None));
        assert_eq!(proxy.get_name().await.unwrap(), "Labour Hour Token");
        assert_eq!(proxy.get_symbol().await.unwrap(), "LHT");
        assert!(proxy.check_validity().await.unwrap());
    }

    #[tokio::test]
    async fn total_supply_is_normalized_without_precision_loss() {
        let (mock, proxy) = setup();
        let raw = U256::from(1_000_000_000_000_000_000u64);
        respond(&mock, &proxy, "totalSupply", vec![DynSolValue::Uint(raw, 256)]);
        assert_eq!(proxy.get_total_supply().await.unwrap(), 1_000_000_000_000_000_000u128);
    }

    #[tokio::test]
    async fn total_supply_overflow_is_reported() {
        let (mock, proxy) = setup();
        respond(&mock, &proxy, "totalSupply", vec![DynSolValue::Uint(U256::MAX, 256)]);
        assert!(matches!(
            proxy.get_total_supply().await,
            Err(DaoError::NumericOverflow { target: "u128", .. })
        ));
    }

    #[tokio::test]
    async fn account_balance_keeps_raw_precision() {
        let (mock, proxy) = setup();
        let big = U256::from(u128::MAX) * U256::from(4u64);
        respond(&mock, &proxy, "balanceOf", vec![DynSolValue::Uint(big, 256)]);
        let owner = "0x5555555555555555555555555555555555555555";
        assert_eq!(proxy.get_account_balance(owner).await.unwrap(), big);
        assert!(matches!(
            proxy.get_account_balance("0x55").await,
            Err(DaoError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn contract_without_symbol_is_invalid() {
        let (_mock, proxy) = setup();
        assert!(!proxy.check_validity().await.unwrap());
    }
}
