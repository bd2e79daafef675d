//! The "exact" scheme on EVM networks.
//!
//! Prices are USD and convert 1:1 into a USD stablecoin, so the whole amount is
//! known at parse time and no facilitator round-trip is needed before the
//! caller sees the terms.

use alloy_primitives::Address;
use paygate_types::chain::{ChainId, EIP155_NAMESPACE};
use paygate_types::price::{AssetAmount, PriceSpec};
use paygate_types::proto::{PaymentRequirements, SupportedPaymentKind};
use paygate_types::scheme::{NegotiationContext, SchemeError, SchemeServer};
use std::collections::HashMap;

use crate::networks::{TokenDeployment, USDC};

pub const EXACT_SCHEME: &str = "exact";

/// Extra key holding the author's price expression.
pub const RAW_PRICE_KEY: &str = "raw_price";

#[derive(Debug, Clone)]
pub struct Eip155Exact {
    assets: HashMap<ChainId, TokenDeployment>,
}

impl Default for Eip155Exact {
    fn default() -> Self {
        Self::new()
    }
}

impl Eip155Exact {
    /// Prices in USDC on every network listed in [`USDC::all`].
    pub fn new() -> Self {
        let assets = USDC::all()
            .into_iter()
            .map(|deployment| (deployment.network.clone(), deployment))
            .collect();
        Self { assets }
    }

    /// Adds or replaces the token used on `deployment.network`.
    pub fn with_asset(mut self, deployment: TokenDeployment) -> Self {
        self.assets.insert(deployment.network.clone(), deployment);
        self
    }

    pub fn asset(&self, network: &ChainId) -> Option<&TokenDeployment> {
        self.assets.get(network)
    }

    fn unsupported(&self, network: &ChainId) -> SchemeError {
        SchemeError::UnsupportedNetwork {
            scheme: EXACT_SCHEME.to_string(),
            network: network.clone(),
        }
    }
}

#[async_trait::async_trait]
impl SchemeServer for Eip155Exact {
    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }

    fn parse_price(&self, price: &str, network: &ChainId) -> Result<AssetAmount, SchemeError> {
        if network.namespace() != EIP155_NAMESPACE {
            return Err(self.unsupported(network));
        }
        let deployment = self.asset(network).ok_or_else(|| self.unsupported(network))?;
        let price = PriceSpec::parse(price)?;
        let amount = price.amount().to_token_units(deployment.decimals)?;
        let mut extra = deployment.extra();
        extra.insert(RAW_PRICE_KEY.into(), price.raw().into());
        Ok(AssetAmount {
            asset: deployment.address.to_string(),
            amount,
            extra,
        })
    }

    /// Checks the recipient is an EVM address and writes it in checksummed form.
    async fn enhance_requirements(
        &self,
        _ctx: &NegotiationContext,
        mut requirements: PaymentRequirements,
        _supported_kind: Option<&SupportedPaymentKind>,
        _extensions: &[String],
    ) -> Result<PaymentRequirements, SchemeError> {
        let pay_to: Address = requirements
            .pay_to
            .trim()
            .parse()
            .map_err(|_| SchemeError::InvalidRecipient(requirements.pay_to.clone()))?;
        requirements.pay_to = pay_to.to_checksum(None);
        Ok(requirements)
    }
}
