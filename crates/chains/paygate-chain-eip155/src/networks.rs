//! Known USDC deployments.

use alloy_primitives::{Address, address};
use paygate_types::chain::ChainId;
use serde_json::{Map, Value};

/// EIP-712 domain of a token, needed by payers to sign transfer authorizations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDeploymentEip712 {
    pub name: String,
    pub version: String,
}

/// A token contract on one EVM network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDeployment {
    pub network: ChainId,
    pub address: Address,
    pub decimals: u32,
    pub eip712: Option<TokenDeploymentEip712>,
}

impl TokenDeployment {
    /// Metadata attached to requirements in this token: the EIP-712 domain, if known.
    pub fn extra(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        if let Some(eip712) = &self.eip712 {
            extra.insert("name".into(), Value::String(eip712.name.clone()));
            extra.insert("version".into(), Value::String(eip712.version.clone()));
        }
        extra
    }
}

/// USD Coin. All deployments use 6 decimals.
pub struct USDC;

impl USDC {
    fn deployment(chain_id: u64, address: Address, name: &str) -> TokenDeployment {
        TokenDeployment {
            network: ChainId::eip155(chain_id),
            address,
            decimals: 6,
            eip712: Some(TokenDeploymentEip712 {
                name: name.into(),
                version: "2".into(),
            }),
        }
    }

    pub fn ethereum() -> TokenDeployment {
        Self::deployment(
            1,
            address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            "USD Coin",
        )
    }

    pub fn base() -> TokenDeployment {
        Self::deployment(
            8453,
            address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            "USD Coin",
        )
    }

    pub fn base_sepolia() -> TokenDeployment {
        Self::deployment(
            84532,
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            "USDC",
        )
    }

    pub fn polygon() -> TokenDeployment {
        Self::deployment(
            137,
            address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
            "USDC",
        )
    }

    pub fn polygon_amoy() -> TokenDeployment {
        Self::deployment(
            80002,
            address!("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582"),
            "USDC",
        )
    }

    pub fn all() -> Vec<TokenDeployment> {
        vec![
            Self::ethereum(),
            Self::base(),
            Self::base_sepolia(),
            Self::polygon(),
            Self::polygon_amoy(),
        ]
    }
}
