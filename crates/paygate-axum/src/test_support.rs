//! In-memory schemes, facilitators and invoice issuers for tests.

use paygate_chain_monero::MoneroExact;
use paygate_types::chain::ChainId;
use paygate_types::facilitator::{Facilitator, FacilitatorError, InvoiceIssuer};
use paygate_types::price::{AssetAmount, PriceSpec};
use paygate_types::proto::{
    CreateInvoiceRequest, Invoice, PaymentOption, ResourceInfo, SettleRequest, SettleResponse,
    SupportedResponse, VerifyRequest, VerifyResponse,
};
use paygate_types::scheme::{NegotiationContext, PayerId, SchemeError, SchemeRegistry, SchemeServer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn network_a() -> ChainId {
    ChainId::new("test", "a")
}

pub fn network_monero() -> ChainId {
    ChainId::monero("stagenet")
}

pub fn option_a() -> PaymentOption {
    PaymentOption::new("exact", network_a(), "alice", "$0.001")
}

pub fn option_monero() -> PaymentOption {
    PaymentOption::new("exact", network_monero(), "", "$0.001")
}

pub fn resource() -> ResourceInfo {
    ResourceInfo {
        url: "http://localhost/weather".into(),
        description: "Weather report".into(),
        mime_type: "application/json".into(),
    }
}

pub fn context(payer: PayerId) -> NegotiationContext {
    NegotiationContext::new(payer, resource())
}

/// Unit scheme (A) on `network_a`, one dollar is a million `A-unit`.
pub struct UnitScheme;

#[async_trait::async_trait]
impl SchemeServer for UnitScheme {
    fn scheme(&self) -> &str {
        "exact"
    }

    fn parse_price(&self, price: &str, _network: &ChainId) -> Result<AssetAmount, SchemeError> {
        let price = PriceSpec::parse(price)?;
        Ok(AssetAmount {
            asset: "A-unit".into(),
            amount: price.amount().to_token_units(6)?,
            extra: Default::default(),
        })
    }
}

/// Records calls and answers from canned results.
pub struct FakeFacilitator {
    verify: Result<VerifyResponse, FacilitatorError>,
    settle: Result<SettleResponse, FacilitatorError>,
    supported: Result<SupportedResponse, FacilitatorError>,
    delay: Option<Duration>,
    supported_delay: Option<Duration>,
    pub verify_calls: AtomicUsize,
    pub settle_calls: AtomicUsize,
    pub supported_calls: AtomicUsize,
    pub verified: Mutex<Vec<VerifyRequest>>,
}

impl Default for FakeFacilitator {
    fn default() -> Self {
        Self {
            verify: Ok(VerifyResponse {
                is_valid: true,
                invalid_reason: None,
                payer: None,
            }),
            settle: Ok(SettleResponse {
                success: true,
                error_reason: None,
                transaction: "0xtx".into(),
                network: network_a().to_string(),
                payer: None,
            }),
            supported: Ok(SupportedResponse::default()),
            delay: None,
            supported_delay: None,
            verify_calls: AtomicUsize::new(0),
            settle_calls: AtomicUsize::new(0),
            supported_calls: AtomicUsize::new(0),
            verified: Mutex::new(Vec::new()),
        }
    }
}

impl FakeFacilitator {
    pub fn with_verify(mut self, verify: Result<VerifyResponse, FacilitatorError>) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_settle(mut self, settle: Result<SettleResponse, FacilitatorError>) -> Self {
        self.settle = settle;
        self
    }

    pub fn without_supported(mut self) -> Self {
        self.supported = Err(FacilitatorError::unavailable("GET /supported", "offline"));
        self
    }

    /// Delays verify and settle.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delays supported only.
    pub fn with_supported_delay(mut self, delay: Duration) -> Self {
        self.supported_delay = Some(delay);
        self
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn settle_count(&self) -> usize {
        self.settle_calls.load(Ordering::SeqCst)
    }

    pub fn supported_count(&self) -> usize {
        self.supported_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl Facilitator for FakeFacilitator {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verified.lock().unwrap().push(request.clone());
        self.pause().await;
        self.verify.clone()
    }

    async fn settle(&self, _request: &SettleRequest) -> Result<SettleResponse, FacilitatorError> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.settle.clone()
    }

    async fn supported(&self) -> Result<SupportedResponse, FacilitatorError> {
        self.supported_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.supported_delay {
            tokio::time::sleep(delay).await;
        }
        self.supported.clone()
    }
}

/// One invoice per bucket key, or always failing when down.
#[derive(Default)]
pub struct FakeInvoices {
    amount_piconero: u64,
    down: bool,
    issued: Mutex<HashMap<String, Invoice>>,
    pub keys: Mutex<Vec<String>>,
}

impl FakeInvoices {
    pub fn with_amount(amount_piconero: u64) -> Self {
        Self {
            amount_piconero,
            ..Default::default()
        }
    }

    pub fn down() -> Self {
        Self {
            down: true,
            ..Default::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InvoiceIssuer for FakeInvoices {
    async fn create_or_get_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<Invoice, FacilitatorError> {
        self.keys.lock().unwrap().push(request.metadata.clone());
        if self.down {
            return Err(FacilitatorError::unavailable(
                "POST /invoices",
                "connection refused",
            ));
        }
        let mut issued = self.issued.lock().unwrap();
        let next = issued.len() + 1;
        let invoice = issued
            .entry(request.metadata.clone())
            .or_insert_with(|| Invoice {
                invoice_id: format!("inv-{next}"),
                address: format!("addr{next}"),
                amount_piconero: self.amount_piconero,
                status: "pending".into(),
                network: Some(network_monero()),
            });
        Ok(invoice.clone())
    }
}

/// `UnitScheme` on `network_a` and Monero on `network_monero`, both behind `facilitator`.
///
/// Pass an `Arc` to keep a handle on the facilitator's call counters.
pub fn two_rail_registry(
    invoices: Arc<FakeInvoices>,
    facilitator: impl Into<Arc<FakeFacilitator>>,
) -> SchemeRegistry {
    let facilitator: Arc<FakeFacilitator> = facilitator.into();
    SchemeRegistry::new()
        .and_register(network_a(), Arc::new(UnitScheme), facilitator.clone())
        .and_register(
            network_monero(),
            Arc::new(MoneroExact::new(invoices)),
            facilitator,
        )
}
