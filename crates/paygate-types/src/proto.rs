//! Wire format types.
//!
//! Messages follow x402 version 2 and serialize with camelCase field names,
//! except for the facilitator invoice endpoint ([`CreateInvoiceRequest`],
//! [`Invoice`]) which speaks snake_case.
//!
//! # Key Types
//!
//! - [`PaymentOption`] - What a route author accepts, in human terms
//! - [`PaymentRequirements`] - Concrete, payable terms presented to a caller
//! - [`PaymentRequired`] - Body of a `402 Payment Required` response
//! - [`PaymentPayload`] - Proof of payment sent back by the caller
//! - [`VerifyRequest`] / [`VerifyResponse`] / [`SettleResponse`] - Facilitator messages
//! - [`SupportedResponse`] - Facilitator capabilities from `GET /supported`

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{VecSkipError, serde_as};
use std::collections::HashMap;
use std::fmt;

use crate::chain::ChainId;
use crate::config::literal_or_env;

/// Version marker, always serialized as the integer `2`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version2;

impl X402Version2 {
    pub const VALUE: u8 = 2;
}

impl Serialize for X402Version2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version2 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version2)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl fmt::Display for X402Version2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Default time a caller has to complete a payment, in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

fn default_max_timeout_seconds() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECONDS
}

/// One accepted way of paying for a route, as configured by its author.
///
/// ```json
/// {
///   "scheme": "exact",
///   "network": "eip155:84532",
///   "payTo": "$EVM_PAY_TO",
///   "price": "$0.001",
///   "description": "Weather report"
/// }
/// ```
///
/// `payTo` may reference an environment variable. Dynamic-address schemes
/// overwrite it, so it may be left empty for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOption {
    pub scheme: String,
    #[serde(default, deserialize_with = "literal_or_env")]
    pub pay_to: String,
    pub price: String,
    pub network: ChainId,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
}

impl PaymentOption {
    pub fn new<S, P, R>(scheme: S, network: ChainId, pay_to: P, price: R) -> Self
    where
        S: Into<String>,
        P: Into<String>,
        R: Into<String>,
    {
        Self {
            scheme: scheme.into(),
            pay_to: pay_to.into(),
            price: price.into(),
            network,
            description: String::new(),
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
        }
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }
}

/// Concrete payment terms for one request.
///
/// `amount` is in the smallest unit of `asset` and kept as a string so no
/// precision is lost on the way to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: ChainId,
    pub amount: String,
    pub pay_to: String,
    pub asset: String,
    pub max_timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentRequirements {
    /// True if these terms are for `scheme` on `network`.
    pub fn matches(&self, scheme: &str, network: &ChainId) -> bool {
        self.scheme == scheme && &self.network == network
    }

    /// True once amount and recipient are concrete: a positive integer amount
    /// and a non-empty recipient.
    pub fn is_payable(&self) -> bool {
        let positive = self.amount.parse::<u128>().is_ok_and(|amount| amount > 0);
        positive && !self.pay_to.trim().is_empty()
    }
}

/// Metadata about the protected resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
}

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: X402Version2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub resource: ResourceInfo,
    pub accepts: Vec<PaymentRequirements>,
}

/// Proof of payment carried in the `X-PAYMENT` header.
///
/// `accepted` echoes the requirements the caller chose to pay; `payload` is
/// rail-specific and opaque to the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version2,
    pub accepted: PaymentRequirements,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
}

/// Body of `POST /verify` and `POST /settle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: X402Version2,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

pub type SettleRequest = VerifyRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Settlement receipt. Returned to the caller in `X-PAYMENT-RESPONSE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// A scheme/network pair a facilitator can handle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl SupportedPaymentKind {
    pub fn matches(&self, scheme: &str, network: &ChainId) -> bool {
        self.scheme == scheme && self.network == network.to_string()
    }
}

/// Response of a facilitator's `GET /supported`. Kinds that fail to parse are skipped.
#[serde_as]
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub signers: HashMap<ChainId, Vec<String>>,
}

impl SupportedResponse {
    pub fn find_kind(&self, scheme: &str, network: &ChainId) -> Option<&SupportedPaymentKind> {
        self.kinds.iter().find(|kind| kind.matches(scheme, network))
    }
}

/// Body of a facilitator's `POST /invoices`.
///
/// `metadata` is the idempotency key: the facilitator returns the open
/// invoice for an identical key instead of minting a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_usd: Decimal,
    pub metadata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_id: Option<String>,
}

/// An invoice with a one-time recipient address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: String,
    pub address: String,
    pub amount_piconero: u64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<ChainId>,
}
