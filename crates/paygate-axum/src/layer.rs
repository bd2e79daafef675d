//! Tower layer that puts x402 payments in front of axum routes.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use paygate_axum::X402Middleware;
//! use paygate_chain_eip155::Eip155Exact;
//! use paygate_axum::facilitator_client::FacilitatorClient;
//! use paygate_types::chain::ChainId;
//! use paygate_types::proto::PaymentOption;
//! use paygate_types::scheme::SchemeRegistry;
//! use std::sync::Arc;
//!
//! let facilitator = Arc::new(FacilitatorClient::try_from("https://facilitator.example/").unwrap());
//! let base_sepolia = ChainId::eip155(84532);
//! let registry = SchemeRegistry::new().and_register(
//!     base_sepolia.clone(),
//!     Arc::new(Eip155Exact::new()),
//!     facilitator,
//! );
//! let x402 = X402Middleware::new(registry);
//!
//! let app: Router = Router::new().route(
//!     "/protected",
//!     get(|| async { "VIP content" }).layer(
//!         x402.with_option(PaymentOption::new(
//!             "exact",
//!             base_sepolia,
//!             "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
//!             "$0.01",
//!         ))
//!         .with_description("Premium content"),
//!     ),
//! );
//! ```
//!
//! ## Configuration Notes
//!
//! - **[`X402Middleware::with_option`]** prices a single route; chain more
//!   [`X402LayerBuilder::with_option`] calls to accept several rails.
//! - **[`X402Middleware::with_routes`]** prices a whole router from a
//!   [`RoutesConfig`]; unlisted routes pass through untouched.
//! - **[`X402Middleware::with_base_url`]** is used to compute resource URLs.
//!   Defaults to `http://localhost/`.
//! - **[`X402Middleware::with_payer_header`]** names the header holding the
//!   payer identity hint, `X-PAYER` by default.
//! - **[`X402Middleware::with_request_timeout`]** bounds negotiation,
//!   verification and settlement together, 120 seconds by default.

use axum_core::extract::Request;
use axum_core::response::Response;
use paygate_types::proto::PaymentOption;
use paygate_types::scheme::SchemeRegistry;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};
use url::Url;

use crate::negotiator::RequirementsNegotiator;
use crate::paygate::{
    DEFAULT_PAYER_HEADER, DEFAULT_REQUEST_TIMEOUT, Paygate, SettlementCallback,
    payer_from_headers,
};
use crate::routes::{RouteConfig, RoutesConfig};

/// Shared payment settings. Create one per application and derive layers from it.
#[derive(Clone)]
pub struct X402Middleware {
    negotiator: RequirementsNegotiator,
    base_url: Option<Arc<Url>>,
    request_timeout: Duration,
    payer_header: Arc<str>,
    settlement_callback: Option<SettlementCallback>,
}

impl fmt::Debug for X402Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X402Middleware")
            .field("registry", self.negotiator.registry())
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("payer_header", &self.payer_header)
            .field("settlement_callback", &self.settlement_callback.is_some())
            .finish()
    }
}

impl X402Middleware {
    pub fn new(registry: SchemeRegistry) -> Self {
        Self {
            negotiator: RequirementsNegotiator::new(Arc::new(registry)),
            base_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            payer_header: Arc::from(DEFAULT_PAYER_HEADER),
            settlement_callback: None,
        }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        self.negotiator.registry()
    }

    /// Sets the base URL used to construct resource URLs.
    ///
    /// Ignored for routes with an explicit [`X402LayerBuilder::with_resource`].
    pub fn with_base_url(&self, base_url: Url) -> Self {
        let mut this = self.clone();
        this.base_url = Some(Arc::new(base_url));
        this
    }

    pub fn with_request_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.request_timeout = timeout;
        this
    }

    pub fn with_payer_header(&self, header: &str) -> Self {
        let mut this = self.clone();
        this.payer_header = Arc::from(header);
        this
    }

    pub fn with_settlement_callback(&self, callback: SettlementCallback) -> Self {
        let mut this = self.clone();
        this.settlement_callback = Some(callback);
        this
    }

    /// Starts a layer for a single route accepting `option`.
    pub fn with_option(&self, option: PaymentOption) -> X402LayerBuilder {
        X402LayerBuilder {
            middleware: self.clone(),
            route: Arc::new(RouteConfig::new(vec![option])),
        }
    }

    /// Layer pricing routes by method and path. Unlisted routes pass through.
    pub fn with_routes(&self, routes: RoutesConfig) -> X402RoutesLayer {
        X402RoutesLayer {
            middleware: self.clone(),
            routes: Arc::new(routes),
        }
    }

    fn paygate(&self, route: &RouteConfig, req: &Request) -> Paygate {
        Paygate {
            negotiator: self.negotiator.clone(),
            options: Arc::new(route.accepts.clone()),
            resource: route
                .resource
                .as_resource_info(self.base_url.as_deref(), req.uri()),
            payer: payer_from_headers(req.headers(), &self.payer_header),
            timeout: self.request_timeout,
            settlement_callback: self.settlement_callback.clone(),
        }
    }
}

/// Builder for a single priced route.
#[derive(Clone, Debug)]
pub struct X402LayerBuilder {
    middleware: X402Middleware,
    route: Arc<RouteConfig>,
}

impl X402LayerBuilder {
    /// Adds another accepted option, after the ones already present.
    pub fn with_option(mut self, option: PaymentOption) -> Self {
        Arc::make_mut(&mut self.route).accepts.push(option);
        self
    }

    /// Sets a description of what the payment grants access to.
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        Arc::make_mut(&mut self.route).resource.description = description.into();
        self
    }

    /// Defaults to `application/json`.
    pub fn with_mime_type<S: Into<String>>(mut self, mime: S) -> Self {
        Arc::make_mut(&mut self.route).resource.mime_type = mime.into();
        self
    }

    /// Sets the full URL of the protected resource, instead of deriving it
    /// from the base URL and request URI.
    pub fn with_resource(mut self, resource: Url) -> Self {
        Arc::make_mut(&mut self.route).resource.url = Some(resource.to_string());
        self
    }
}

impl<S> Layer<S> for X402LayerBuilder
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = X402MiddlewareService;

    fn layer(&self, inner: S) -> Self::Service {
        X402MiddlewareService {
            middleware: self.middleware.clone(),
            pricing: Pricing::Route(self.route.clone()),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Layer driven by a [`RoutesConfig`].
#[derive(Clone, Debug)]
pub struct X402RoutesLayer {
    middleware: X402Middleware,
    routes: Arc<RoutesConfig>,
}

impl<S> Layer<S> for X402RoutesLayer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = X402MiddlewareService;

    fn layer(&self, inner: S) -> Self::Service {
        X402MiddlewareService {
            middleware: self.middleware.clone(),
            pricing: Pricing::Table(self.routes.clone()),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

#[derive(Clone, Debug)]
enum Pricing {
    Route(Arc<RouteConfig>),
    Table(Arc<RoutesConfig>),
}

impl Pricing {
    fn route_for(&self, req: &Request) -> Option<Arc<RouteConfig>> {
        match self {
            Pricing::Route(route) => Some(route.clone()),
            Pricing::Table(routes) => routes.lookup(req.method(), req.uri().path()),
        }
    }
}

/// Service that enforces payment on incoming requests.
#[derive(Clone)]
pub struct X402MiddlewareService {
    middleware: X402Middleware,
    pricing: Pricing,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl Service<Request> for X402MiddlewareService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let inner = self.inner.clone();
        match self.pricing.route_for(&req) {
            Some(route) => {
                let gate = self.middleware.paygate(&route, &req);
                Box::pin(gate.handle_request(inner, req))
            }
            None => Box::pin(inner.oneshot(req)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paygate::{PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER};
    use crate::routes::RouteKey;
    use crate::test_support::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use http::{Method, StatusCode};
    use paygate_types::proto::{PaymentPayload, PaymentRequired, SettleResponse, X402Version2};
    use paygate_types::util::Base64Bytes;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn payment_required(response: Response) -> PaymentRequired {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn weather_routes() -> RoutesConfig {
        let route = RouteConfig {
            accepts: vec![option_a(), option_monero()],
            resource: Default::default(),
        };
        RoutesConfig::new().and_route(RouteKey::new(Method::GET, "/weather"), route)
    }

    fn app(x402: &X402Middleware) -> Router {
        Router::new()
            .route("/weather", get(|| async { "sunny" }))
            .route("/health", get(|| async { "ok" }))
            .layer(x402.with_routes(weather_routes()))
    }

    fn get_request(path: &str) -> Request {
        http::Request::get(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_unpriced_route_passes_through() {
        let invoices = Arc::new(FakeInvoices::with_amount(4200));
        let x402 = X402Middleware::new(two_rail_registry(invoices.clone(), FakeFacilitator::default()));

        let response = app(&x402).oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(invoices.keys().is_empty());
    }

    #[tokio::test]
    async fn test_priced_route_lists_every_rail() {
        let invoices = Arc::new(FakeInvoices::with_amount(4200));
        let x402 = X402Middleware::new(two_rail_registry(invoices.clone(), FakeFacilitator::default()))
            .with_base_url(Url::parse("https://api.example.com/").unwrap());

        let response = app(&x402).oneshot(get_request("/weather")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = payment_required(response).await;
        assert_eq!(body.resource.url, "https://api.example.com/weather");
        assert_eq!(body.accepts.len(), 2);
        assert_eq!(body.accepts[0].network, network_a());
        assert_eq!(body.accepts[1].pay_to, "addr1");
        assert_eq!(body.accepts[1].amount, "4200");
        assert_eq!(body.accepts[1].extra["raw_price"], "$0.001");
    }

    #[tokio::test]
    async fn test_polling_reuses_invoice_per_payer() {
        let invoices = Arc::new(FakeInvoices::with_amount(4200));
        let x402 = X402Middleware::new(two_rail_registry(invoices.clone(), FakeFacilitator::default()))
            .with_payer_header("X-Agent");
        let app = app(&x402);

        let request = |agent: &str| {
            http::Request::get("/weather")
                .header("X-Agent", agent)
                .body(Body::empty())
                .unwrap()
        };
        let first = payment_required(app.clone().oneshot(request("agent-7")).await.unwrap()).await;
        let again = payment_required(app.clone().oneshot(request("agent-7")).await.unwrap()).await;
        let other = payment_required(app.clone().oneshot(request("agent-8")).await.unwrap()).await;

        assert_eq!(first.accepts[1].pay_to, again.accepts[1].pay_to);
        assert_ne!(first.accepts[1].pay_to, other.accepts[1].pay_to);
        assert_eq!(
            invoices.keys(),
            vec![
                "agent-7-monero:stagenet-0.001",
                "agent-7-monero:stagenet-0.001",
                "agent-8-monero:stagenet-0.001",
            ]
        );
    }

    #[tokio::test]
    async fn test_invoice_outage_degrades_to_other_rail() {
        let invoices = Arc::new(FakeInvoices::down());
        let x402 = X402Middleware::new(two_rail_registry(invoices, FakeFacilitator::default()));

        let response = app(&x402).oneshot(get_request("/weather")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = payment_required(response).await;
        assert_eq!(body.accepts.len(), 1);
        assert_eq!(body.accepts[0].network, network_a());
    }

    #[tokio::test]
    async fn test_paid_request_reaches_handler() {
        let invoices = Arc::new(FakeInvoices::with_amount(4200));
        let facilitator = Arc::new(FakeFacilitator::default());
        let settlements = Arc::new(AtomicUsize::new(0));
        let counter = settlements.clone();
        let x402 = X402Middleware::new(two_rail_registry(invoices, facilitator.clone()))
            .with_settlement_callback(Arc::new(move |_: &SettleResponse| -> Result<(), crate::paygate::BoxError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        let app = app(&x402);

        let offer = payment_required(app.clone().oneshot(get_request("/weather")).await.unwrap()).await;
        let payload = PaymentPayload {
            x402_version: X402Version2,
            accepted: offer.accepts[1].clone(),
            payload: json!({ "tx_hash": "abc", "tx_key": "def" }),
            resource: Some(offer.resource.clone()),
        };
        let proof = Base64Bytes::encode_json(&payload).unwrap().to_string();
        let request = http::Request::get("/weather")
            .header(PAYMENT_HEADER, proof)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"sunny");
        assert_eq!(settlements.load(Ordering::SeqCst), 1);

        assert_eq!(facilitator.verify_count(), 1);
        assert_eq!(facilitator.settle_count(), 1);
        let verified = facilitator.verified.lock().unwrap();
        assert_eq!(verified[0].payment_requirements, offer.accepts[1]);
        assert_eq!(verified[0].payment_requirements.network, network_monero());
    }

    #[tokio::test]
    async fn test_single_route_builder() {
        let invoices = Arc::new(FakeInvoices::with_amount(4200));
        let x402 = X402Middleware::new(two_rail_registry(invoices.clone(), FakeFacilitator::default()));
        let layer = x402
            .with_option(option_a())
            .with_option(option_monero())
            .with_description("Forecast")
            .with_mime_type("text/plain")
            .with_resource(Url::parse("https://cdn.example.com/forecast").unwrap());
        let app = Router::new().route("/forecast", get(|| async { "rain" }).layer(layer));

        let response = app.oneshot(get_request("/forecast")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = payment_required(response).await;
        assert_eq!(body.resource.url, "https://cdn.example.com/forecast");
        assert_eq!(body.resource.description, "Forecast");
        assert_eq!(body.resource.mime_type, "text/plain");
        assert_eq!(body.accepts.len(), 2);
        assert_eq!(body.accepts[0].description, "Forecast");
        assert_eq!(invoices.keys().len(), 1);
    }
}
