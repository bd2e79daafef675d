//! Payment schemes.
//!
//! A scheme implements one payment rail on one family of networks. All rails
//! share the same small contract, [`SchemeServer`]:
//!
//! - [`SchemeServer::scheme`] names the scheme (`"exact"`), matched against proofs
//! - [`SchemeServer::parse_price`] turns an author price into an [`AssetAmount`]
//! - [`SchemeServer::enhance_requirements`] turns nominal terms into payable ones,
//!   possibly calling out to a facilitator
//!
//! Rails with a fixed price conversion resolve everything in `parse_price` and
//! keep the default, identity enhancement. Rails that need a fresh address or a
//! live exchange rate return a placeholder amount from `parse_price` and do the
//! real work during enhancement.
//!
//! The [`SchemeRegistry`] pairs each scheme/network with the facilitator that
//! verifies and settles its proofs. It is built once at startup and only read
//! afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::chain::ChainId;
use crate::facilitator::{Facilitator, FacilitatorError};
use crate::price::{AssetAmount, MoneyAmountParseError};
use crate::proto::{PaymentRequirements, ResourceInfo, SupportedPaymentKind};

/// Who is paying, as far as invoice bucketing is concerned.
///
/// This is a caller-supplied hint, never a credential. Requests without one
/// share the [`PayerId::ANONYMOUS`] identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayerId(String);

impl PayerId {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    /// Blank values fall back to the anonymous identity.
    pub fn new<S: AsRef<str>>(value: S) -> Self {
        match value.as_ref().trim() {
            "" => Self::anonymous(),
            trimmed => Self(trimmed.to_string()),
        }
    }

    pub fn from_header_value(value: Option<&str>) -> Self {
        value.map(Self::new).unwrap_or_else(Self::anonymous)
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == Self::ANONYMOUS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PayerId {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Display for PayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request-scoped inputs to negotiation.
#[derive(Debug, Clone)]
pub struct NegotiationContext {
    pub payer: PayerId,
    pub resource: ResourceInfo,
}

impl NegotiationContext {
    pub fn new(payer: PayerId, resource: ResourceInfo) -> Self {
        Self { payer, resource }
    }
}

/// Scheme-local failures. During negotiation any of these only removes the
/// offending option.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemeError {
    #[error("Unparseable price: {0}")]
    Parse(#[from] MoneyAmountParseError),
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
    #[error("Missing requirement metadata extra[\"{0}\"]")]
    MissingMetadata(&'static str),
    #[error("Scheme {scheme} does not serve network {network}")]
    UnsupportedNetwork { scheme: String, network: ChainId },
    #[error("Invalid recipient {0:?}")]
    InvalidRecipient(String),
    #[error("A payer identity is required to pay on {0}")]
    PayerIdentityRequired(ChainId),
    #[error("Facilitator unavailable: {0}")]
    FacilitatorUnavailable(String),
    #[error("Facilitator protocol error: {0}")]
    FacilitatorProtocol(String),
}

impl SchemeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FacilitatorUnavailable(_))
    }
}

impl From<FacilitatorError> for SchemeError {
    fn from(err: FacilitatorError) -> Self {
        match err {
            FacilitatorError::Unavailable { .. } => Self::FacilitatorUnavailable(err.to_string()),
            FacilitatorError::Protocol { .. } => Self::FacilitatorProtocol(err.to_string()),
        }
    }
}

/// Server side of a payment scheme. One instance serves all concurrent
/// requests on the networks it is registered for.
#[async_trait::async_trait]
pub trait SchemeServer: Send + Sync {
    /// Stable scheme name, e.g. `"exact"`.
    fn scheme(&self) -> &str;

    /// Converts an author price into an amount on `network`.
    fn parse_price(&self, price: &str, network: &ChainId) -> Result<AssetAmount, SchemeError>;

    /// Whether [`Self::enhance_requirements`] reads the facilitator's
    /// supported kinds. When `false`, enhancement always gets `None` and
    /// `/supported` is never fetched for this scheme.
    fn uses_supported_kinds(&self) -> bool {
        false
    }

    /// Makes `requirements` concrete. Must give equivalent results for
    /// equivalent inputs. The default returns them unchanged.
    async fn enhance_requirements(
        &self,
        ctx: &NegotiationContext,
        requirements: PaymentRequirements,
        supported_kind: Option<&SupportedPaymentKind>,
        extensions: &[String],
    ) -> Result<PaymentRequirements, SchemeError> {
        let _ = (ctx, supported_kind, extensions);
        Ok(requirements)
    }
}

/// Registry key: a scheme name on a concrete network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemeSlug {
    pub network: ChainId,
    pub scheme: String,
}

impl SchemeSlug {
    pub fn new<S: Into<String>>(network: ChainId, scheme: S) -> Self {
        Self {
            network,
            scheme: scheme.into(),
        }
    }
}

impl fmt::Display for SchemeSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.scheme, self.network)
    }
}

/// A scheme together with the facilitator that verifies and settles for it.
#[derive(Clone)]
pub struct SchemeEntry {
    pub scheme: Arc<dyn SchemeServer>,
    pub facilitator: Arc<dyn Facilitator>,
}

#[derive(Clone, Default)]
pub struct SchemeRegistry(HashMap<SchemeSlug, SchemeEntry>);

impl fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slugs: Vec<String> = self.0.keys().map(|s| s.to_string()).collect();
        f.debug_tuple("SchemeRegistry").field(&slugs).finish()
    }
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `scheme` on `network`, served by `facilitator`.
    pub fn register(
        &mut self,
        network: ChainId,
        scheme: Arc<dyn SchemeServer>,
        facilitator: Arc<dyn Facilitator>,
    ) {
        let slug = SchemeSlug::new(network, scheme.scheme());
        tracing::info!("Registered scheme {}", slug);
        let previous = self.0.insert(slug.clone(), SchemeEntry { scheme, facilitator });
        if previous.is_some() {
            tracing::warn!("Scheme {} registered twice, keeping the latest", slug);
        }
    }

    pub fn and_register(
        mut self,
        network: ChainId,
        scheme: Arc<dyn SchemeServer>,
        facilitator: Arc<dyn Facilitator>,
    ) -> Self {
        self.register(network, scheme, facilitator);
        self
    }

    pub fn by_slug(&self, slug: &SchemeSlug) -> Option<&SchemeEntry> {
        self.0.get(slug)
    }

    pub fn get(&self, scheme: &str, network: &ChainId) -> Option<&SchemeEntry> {
        self.by_slug(&SchemeSlug::new(network.clone(), scheme))
    }

    pub fn slugs(&self) -> impl Iterator<Item = &SchemeSlug> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse};

    struct Flat;

    #[async_trait::async_trait]
    impl SchemeServer for Flat {
        fn scheme(&self) -> &str {
            "flat"
        }

        fn parse_price(&self, price: &str, _network: &ChainId) -> Result<AssetAmount, SchemeError> {
            Ok(AssetAmount {
                asset: "UNIT".into(),
                amount: price.into(),
                extra: Default::default(),
            })
        }
    }

    struct NoFacilitator;

    #[async_trait::async_trait]
    impl Facilitator for NoFacilitator {
        async fn verify(&self, _: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError> {
            Err(FacilitatorError::unavailable("POST /verify", "offline"))
        }
        async fn settle(&self, _: &SettleRequest) -> Result<SettleResponse, FacilitatorError> {
            Err(FacilitatorError::unavailable("POST /settle", "offline"))
        }
        async fn supported(&self) -> Result<SupportedResponse, FacilitatorError> {
            Ok(SupportedResponse::default())
        }
    }

    #[test]
    fn test_payer_id_fallback() {
        assert!(PayerId::from_header_value(None).is_anonymous());
        assert!(PayerId::from_header_value(Some("   ")).is_anonymous());
        assert_eq!(PayerId::from_header_value(Some(" agent-7 ")).as_str(), "agent-7");
    }

    #[test]
    fn test_facilitator_error_mapping() {
        let unavailable: SchemeError = FacilitatorError::unavailable("POST /invoices", "refused").into();
        assert!(unavailable.is_retryable());
        let protocol: SchemeError = FacilitatorError::protocol("POST /invoices", "bad json").into();
        assert!(matches!(protocol, SchemeError::FacilitatorProtocol(_)));
        assert!(!protocol.is_retryable());
    }

    #[tokio::test]
    async fn test_default_enhancement_is_identity() {
        let network = ChainId::new("test", "a");
        let asset = Flat.parse_price("1000", &network).unwrap();
        let requirements = PaymentRequirements {
            scheme: "flat".into(),
            network: network.clone(),
            amount: asset.amount,
            pay_to: "alice".into(),
            asset: asset.asset,
            max_timeout_seconds: 60,
            description: String::new(),
            extra: Default::default(),
        };
        let ctx = NegotiationContext::new(
            PayerId::anonymous(),
            ResourceInfo {
                url: "http://localhost/".into(),
                description: String::new(),
                mime_type: String::new(),
            },
        );
        let enhanced = Flat
            .enhance_requirements(&ctx, requirements.clone(), None, &[])
            .await
            .unwrap();
        assert_eq!(enhanced, requirements);
    }

    #[test]
    fn test_registry_lookup() {
        let network = ChainId::new("test", "a");
        let registry = SchemeRegistry::new().and_register(
            network.clone(),
            Arc::new(Flat),
            Arc::new(NoFacilitator),
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get("flat", &network).is_some());
        assert!(registry.get("exact", &network).is_none());
        assert!(registry.get("flat", &ChainId::new("test", "b")).is_none());
    }
}
