//! Contract descriptors: immutable interface metadata used to bind handles.
//!
//! A descriptor is read from a contract build artifact:
//!
//! ```json
//! {
//!   "contractName": "ChronoBankAssetProxy",
//!   "abi": [ ... ],
//!   "networks": { "1": { "address": "0x..." } }
//! }
//! ```

use std::collections::HashMap;

use alloy_json_abi::{Event, Function, JsonAbi};
use serde::Deserialize;

use crate::error::DaoError;

/// Where a contract was deployed on one network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeployment {
    pub address: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// Interface metadata for one contract: its ABI plus known deployments.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDescriptor {
    pub contract_name: String,
    pub abi: JsonAbi,
    /// Deployments keyed by network id.
    #[serde(default)]
    pub networks: HashMap<String, NetworkDeployment>,
}

impl ContractDescriptor {
    /// Parse a build artifact JSON document.
    pub fn from_artifact_json(json: &str) -> Result<Self, DaoError> {
        serde_json::from_str(json).map_err(|e| DaoError::Abi(format!("invalid artifact JSON: {e}")))
    }

    /// Build a descriptor from a bare ABI JSON array.
    pub fn from_abi_json(
        contract_name: impl Into<String>,
        abi_json: &str,
    ) -> Result<Self, DaoError> {
        let abi: JsonAbi = serde_json::from_str(abi_json)
            .map_err(|e| DaoError::Abi(format!("invalid ABI JSON: {e}")))?;
        Ok(Self {
            contract_name: contract_name.into(),
            abi,
            networks: HashMap::new(),
        })
    }

    /// Record a deployment address for `network_id`.
    pub fn with_deployment(
        mut self,
        network_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        self.networks.insert(
            network_id.into(),
            NetworkDeployment {
                address: address.into(),
                transaction_hash: None,
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.contract_name
    }

    /// Address recorded for `network_id`, if any.
    pub fn deployment(&self, network_id: &str) -> Option<&str> {
        self.networks.get(network_id).map(|d| d.address.as_str())
    }

    /// Look up a function by name (first overload wins).
    pub fn function(&self, name: &str) -> Result<&Function, DaoError> {
        self.abi
            .functions()
            .find(|f| f.name == name)
            .ok_or_else(|| DaoError::UnknownFunction {
                contract: self.contract_name.clone(),
                name: name.to_string(),
            })
    }

    /// Look up an event by name (first overload wins).
    pub fn event(&self, name: &str) -> Result<&Event, DaoError> {
        self.abi
            .events()
            .find(|e| e.name == name)
            .ok_or_else(|| DaoError::UnknownEvent {
                contract: self.contract_name.clone(),
                name: name.to_string(),
            })
    }

    /// Returns `true` if the ABI declares every function in `names`.
    pub fn implements(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.function(n).is_ok())
    }
}
