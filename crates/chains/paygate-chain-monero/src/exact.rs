//! The "exact" scheme on Monero networks.
//!
//! Every payer gets a one-time subaddress and the USD price is converted to
//! piconero by the facilitator, so neither is known when the price is parsed.
//! [`MoneroExact::parse_price`] only validates the price and stashes it in
//! `extra["raw_price"]`; [`MoneroExact::enhance_requirements`] asks the
//! facilitator for an invoice and writes its address and amount into the
//! requirements.
//!
//! Invoices are reused: the request carries a bucket key built from payer,
//! network and nominal price, and the facilitator hands back the open invoice
//! for a known key. Polling an unpaid resource therefore keeps showing the same
//! address instead of minting a new one per request.

use paygate_types::chain::{ChainId, MONERO_NAMESPACE};
use paygate_types::facilitator::InvoiceIssuer;
use paygate_types::price::{AssetAmount, PriceSpec};
use paygate_types::proto::{CreateInvoiceRequest, Invoice, PaymentRequirements, SupportedPaymentKind};
use paygate_types::scheme::{NegotiationContext, PayerId, SchemeError, SchemeServer};
use serde_json::{Map, Value};
use std::sync::{Arc, Once};

pub const EXACT_SCHEME: &str = "exact";
pub const XMR_ASSET: &str = "XMR";

/// Extra key holding the author's price expression.
pub const RAW_PRICE_KEY: &str = "raw_price";
/// Extra key holding the facilitator's invoice id.
pub const INVOICE_ID_KEY: &str = "invoice_id";

/// Key under which the facilitator reuses invoices.
pub fn bucket_key(payer: &PayerId, network: &ChainId, nominal_price: &str) -> String {
    format!("{payer}-{network}-{nominal_price}")
}

pub struct MoneroExact {
    invoices: Arc<dyn InvoiceIssuer>,
    require_payer_identity: bool,
    anonymous_notice: Once,
}

impl MoneroExact {
    pub fn new(invoices: Arc<dyn InvoiceIssuer>) -> Self {
        Self {
            invoices,
            require_payer_identity: false,
            anonymous_notice: Once::new(),
        }
    }

    /// When set, callers without a payer identity are not offered this rail,
    /// so distinct anonymous callers never share an invoice.
    pub fn require_payer_identity(mut self, required: bool) -> Self {
        self.require_payer_identity = required;
        self
    }

    fn ensure_network(network: &ChainId) -> Result<(), SchemeError> {
        if network.namespace() == MONERO_NAMESPACE {
            Ok(())
        } else {
            Err(SchemeError::UnsupportedNetwork {
                scheme: EXACT_SCHEME.to_string(),
                network: network.clone(),
            })
        }
    }

    fn check_payer(&self, payer: &PayerId, network: &ChainId) -> Result<(), SchemeError> {
        if !payer.is_anonymous() {
            return Ok(());
        }
        if self.require_payer_identity {
            return Err(SchemeError::PayerIdentityRequired(network.clone()));
        }
        self.anonymous_notice.call_once(|| {
            tracing::warn!(
                %network,
                "Anonymous payers share one invoice per price; set a payer identity header to separate them"
            );
        });
        Ok(())
    }
}

/// An invoice must name a recipient and a positive amount on the requested network.
fn validate_invoice(invoice: &Invoice, network: &ChainId) -> Result<(), SchemeError> {
    if invoice.address.trim().is_empty() {
        return Err(SchemeError::FacilitatorProtocol(format!(
            "invoice {} has no address",
            invoice.invoice_id
        )));
    }
    if invoice.amount_piconero == 0 {
        return Err(SchemeError::FacilitatorProtocol(format!(
            "invoice {} has a zero amount",
            invoice.invoice_id
        )));
    }
    match &invoice.network {
        Some(invoice_network) if invoice_network != network => {
            Err(SchemeError::FacilitatorProtocol(format!(
                "invoice {} is for {invoice_network}, expected {network}",
                invoice.invoice_id
            )))
        }
        _ => Ok(()),
    }
}

#[async_trait::async_trait]
impl SchemeServer for MoneroExact {
    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }

    fn uses_supported_kinds(&self) -> bool {
        true
    }

    fn parse_price(&self, price: &str, network: &ChainId) -> Result<AssetAmount, SchemeError> {
        Self::ensure_network(network)?;
        let price = PriceSpec::parse(price)?;
        let mut extra = Map::new();
        extra.insert(RAW_PRICE_KEY.into(), Value::String(price.raw().to_string()));
        Ok(AssetAmount {
            asset: XMR_ASSET.to_string(),
            amount: "0".to_string(),
            extra,
        })
    }

    async fn enhance_requirements(
        &self,
        ctx: &NegotiationContext,
        mut requirements: PaymentRequirements,
        supported_kind: Option<&SupportedPaymentKind>,
        _extensions: &[String],
    ) -> Result<PaymentRequirements, SchemeError> {
        let network = requirements.network.clone();
        Self::ensure_network(&network)?;
        let raw_price = match requirements.extra.get(RAW_PRICE_KEY) {
            None => return Err(SchemeError::MissingMetadata(RAW_PRICE_KEY)),
            Some(Value::String(raw_price)) => raw_price.clone(),
            Some(other) => return Err(SchemeError::InvalidPrice(other.to_string())),
        };
        let price = PriceSpec::parse(&raw_price)
            .map_err(|e| SchemeError::InvalidPrice(format!("{raw_price:?}: {e}")))?;
        self.check_payer(&ctx.payer, &network)?;
        if supported_kind.is_none() {
            tracing::debug!(%network, "Facilitator does not advertise monero exact, requesting invoice anyway");
        }

        let request = CreateInvoiceRequest {
            amount_usd: price.amount().0,
            metadata: bucket_key(&ctx.payer, &network, &price.nominal()),
            payer_id: (!ctx.payer.is_anonymous()).then(|| ctx.payer.to_string()),
        };
        let invoice = self.invoices.create_or_get_invoice(&request).await?;
        validate_invoice(&invoice, &network)?;
        tracing::debug!(
            invoice_id = %invoice.invoice_id,
            status = %invoice.status,
            bucket = %request.metadata,
            "Resolved monero invoice"
        );

        requirements.pay_to = invoice.address;
        requirements.amount = invoice.amount_piconero.to_string();
        requirements
            .extra
            .insert(INVOICE_ID_KEY.into(), Value::String(invoice.invoice_id));
        Ok(requirements)
    }
}
