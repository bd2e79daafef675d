//! A [`Facilitator`] and [`InvoiceIssuer`] that talks to a _remote_ facilitator over HTTP.
//!
//! [`FacilitatorClient`] handles `POST /verify`, `POST /settle`, `GET /supported`
//! and `POST /invoices` relative to a base URL.
//!
//! ## Example
//!
//! ```rust
//! use paygate_axum::facilitator_client::FacilitatorClient;
//! use std::time::Duration;
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.example/")
//!     .unwrap()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_bearer_token("secret")
//!     .unwrap();
//! ```
//!
//! ## Error Handling
//!
//! [`FacilitatorClientError`] keeps the transport-level detail (URL, HTTP,
//! status, body decoding). When crossing into the gate it collapses into a
//! [`FacilitatorError`]: anything a retry could fix becomes
//! [`FacilitatorError::Unavailable`], anything that points at a protocol
//! mismatch becomes [`FacilitatorError::Protocol`].

use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue, StatusCode};
use paygate_types::facilitator::{Facilitator, FacilitatorError, InvoiceIssuer};
use paygate_types::proto::{
    CreateInvoiceRequest, Invoice, SettleRequest, SettleResponse, SupportedResponse,
    VerifyRequest, VerifyResponse,
};
use reqwest::{Client, RequestBuilder};
use std::fmt::Display;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{Span, instrument};
use url::Url;

/// TTL cache for [`SupportedResponse`].
#[derive(Clone, Debug)]
struct SupportedCacheState {
    response: SupportedResponse,
    expires_at: Instant,
}

/// TTL cache for the `/supported` endpoint response.
///
/// Each clone starts empty.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    state: RwLock<Option<SupportedCacheState>>,
}

impl SupportedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Returns the cached response if it has not expired.
    pub async fn get(&self) -> Option<SupportedResponse> {
        let guard = self.state.read().await;
        let cache = guard.as_ref()?;
        (Instant::now() < cache.expires_at).then(|| cache.response.clone())
    }

    pub async fn set(&self, response: SupportedResponse) {
        let mut guard = self.state.write().await;
        *guard = Some(SupportedCacheState {
            response,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub async fn clear(&self) {
        let mut guard = self.state.write().await;
        *guard = None;
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// Facilitator endpoint a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilitatorOperation {
    Verify,
    Settle,
    Supported,
    Invoices,
}

impl FacilitatorOperation {
    fn context(self) -> &'static str {
        match self {
            FacilitatorOperation::Verify => "POST /verify",
            FacilitatorOperation::Settle => "POST /settle",
            FacilitatorOperation::Supported => "GET /supported",
            FacilitatorOperation::Invoices => "POST /invoices",
        }
    }
}

/// Authentication headers, set separately per operation.
///
/// Facilitators commonly protect `/settle` and `/invoices` while leaving
/// `/supported` public, so each endpoint carries its own header set.
#[derive(Clone, Debug, Default)]
pub struct FacilitatorAuth {
    pub verify: HeaderMap,
    pub settle: HeaderMap,
    pub supported: HeaderMap,
    pub invoices: HeaderMap,
}

impl FacilitatorAuth {
    /// `Authorization: Bearer <token>` on every operation.
    pub fn bearer(token: &str) -> Result<Self, FacilitatorClientError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            FacilitatorClientError::InvalidHeader {
                context: "Bearer token",
                source: e,
            }
        })?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(Self {
            verify: headers.clone(),
            settle: headers.clone(),
            supported: headers.clone(),
            invoices: headers,
        })
    }

    pub fn headers(&self, operation: FacilitatorOperation) -> &HeaderMap {
        match operation {
            FacilitatorOperation::Verify => &self.verify,
            FacilitatorOperation::Settle => &self.settle,
            FacilitatorOperation::Supported => &self.supported,
            FacilitatorOperation::Invoices => &self.invoices,
        }
    }
}

/// Client for a remote facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    invoices_url: Url,
    client: Client,
    /// Sent with every request
    headers: HeaderMap,
    auth: FacilitatorAuth,
    /// Applies to verify, settle and supported
    timeout: Option<Duration>,
    invoice_timeout: Duration,
    supported_cache: SupportedCache,
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid header value: {context}: {source}")]
    InvalidHeader {
        context: &'static str,
        #[source]
        source: InvalidHeaderValue,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl From<FacilitatorClientError> for FacilitatorError {
    fn from(err: FacilitatorClientError) -> Self {
        match &err {
            FacilitatorClientError::Http { context, .. }
            | FacilitatorClientError::HttpStatus { context, .. }
            | FacilitatorClientError::ResponseBodyRead { context, .. } => {
                FacilitatorError::unavailable(*context, &err)
            }
            FacilitatorClientError::UrlParse { context, .. }
            | FacilitatorClientError::InvalidHeader { context, .. }
            | FacilitatorClientError::JsonDeserialization { context, .. } => {
                FacilitatorError::protocol(*context, &err)
            }
        }
    }
}

impl FacilitatorClient {
    /// Default TTL for caching the supported endpoint response (10 minutes).
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
    /// Default timeout of verify, settle and supported requests.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default timeout of `POST /invoices`.
    pub const DEFAULT_INVOICE_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    pub fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    pub fn supported_url(&self) -> &Url {
        &self.supported_url
    }

    pub fn invoices_url(&self) -> &Url {
        &self.invoices_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn auth(&self) -> &FacilitatorAuth {
        &self.auth
    }

    pub fn timeout(&self) -> &Option<Duration> {
        &self.timeout
    }

    pub fn invoice_timeout(&self) -> Duration {
        self.invoice_timeout
    }

    pub fn supported_cache(&self) -> &SupportedCache {
        &self.supported_cache
    }

    /// Constructs a client with endpoint URLs relative to `base_url`.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let join = |path: &str, context: &'static str| {
            base_url
                .join(path)
                .map_err(|e| FacilitatorClientError::UrlParse { context, source: e })
        };
        Ok(Self {
            verify_url: join("./verify", "Failed to construct ./verify URL")?,
            settle_url: join("./settle", "Failed to construct ./settle URL")?,
            supported_url: join("./supported", "Failed to construct ./supported URL")?,
            invoices_url: join("./invoices", "Failed to construct ./invoices URL")?,
            client: Client::new(),
            base_url,
            headers: HeaderMap::new(),
            auth: FacilitatorAuth::default(),
            timeout: Some(Self::DEFAULT_TIMEOUT),
            invoice_timeout: Self::DEFAULT_INVOICE_TIMEOUT,
            supported_cache: SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL),
        })
    }

    /// Attaches headers to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    pub fn with_auth(&self, auth: FacilitatorAuth) -> Self {
        let mut this = self.clone();
        this.auth = auth;
        this
    }

    /// Sends `Authorization: Bearer <token>` to every endpoint.
    pub fn with_bearer_token(&self, token: &str) -> Result<Self, FacilitatorClientError> {
        Ok(self.with_auth(FacilitatorAuth::bearer(token)?))
    }

    /// Timeout of verify, settle and supported requests. Defaults to [`Self::DEFAULT_TIMEOUT`].
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    pub fn with_invoice_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.invoice_timeout = timeout;
        this
    }

    /// Sets the TTL for caching the supported endpoint response.
    ///
    /// Default is 10 minutes. Use [`Self::without_supported_cache()`] to disable caching.
    pub fn with_supported_cache_ttl(&self, ttl: Duration) -> Self {
        let mut this = self.clone();
        this.supported_cache = SupportedCache::new(ttl);
        this
    }

    pub fn without_supported_cache(&self) -> Self {
        self.with_supported_cache_ttl(Duration::ZERO)
    }

    #[instrument(
        name = "paygate.facilitator_client.verify",
        skip_all,
        fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty)
    )]
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        let builder = self.client.post(self.verify_url.clone()).json(request);
        self.send_json(FacilitatorOperation::Verify, builder, self.timeout)
            .await
    }

    #[instrument(
        name = "paygate.facilitator_client.settle",
        skip_all,
        fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty)
    )]
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        let builder = self.client.post(self.settle_url.clone()).json(request);
        self.send_json(FacilitatorOperation::Settle, builder, self.timeout)
            .await
    }

    /// Sends a `GET /supported` request, bypassing the cache.
    #[instrument(
        name = "paygate.facilitator_client.supported",
        skip_all,
        fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty)
    )]
    async fn supported_inner(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        let builder = self.client.get(self.supported_url.clone());
        self.send_json(FacilitatorOperation::Supported, builder, self.timeout)
            .await
    }

    /// Cached `GET /supported`.
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        if let Some(response) = self.supported_cache.get().await {
            return Ok(response);
        }
        tracing::info!("paygate.facilitator_client.supported_cache_miss");
        let response = self.supported_inner().await?;
        self.supported_cache.set(response.clone()).await;
        Ok(response)
    }

    /// `POST /invoices`. The facilitator returns the open invoice for a known
    /// `metadata` key instead of creating a new one.
    #[instrument(
        name = "paygate.facilitator_client.invoices",
        skip_all,
        fields(
            bucket = %request.metadata,
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty
        )
    )]
    pub async fn create_or_get_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<Invoice, FacilitatorClientError> {
        let builder = self.client.post(self.invoices_url.clone()).json(request);
        self.send_json(
            FacilitatorOperation::Invoices,
            builder,
            Some(self.invoice_timeout),
        )
        .await
    }

    /// Applies headers and timeout, sends the request and decodes a JSON body
    /// from any 2xx response.
    async fn send_json<R>(
        &self,
        operation: FacilitatorOperation,
        builder: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let context = operation.context();
        let mut req = builder;
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        for (key, value) in self.auth.headers(operation).iter() {
            req = req.header(key, value);
        }
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let result = Self::execute(context, req).await;

        record_result_on_span(&result);

        result
    }

    async fn execute<R>(context: &'static str, req: RequestBuilder) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;
        let status = http_response.status();
        if status.is_success() {
            let bytes = http_response
                .bytes()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            serde_json::from_slice::<R>(&bytes)
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

#[async_trait::async_trait]
impl Facilitator for FacilitatorClient {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError> {
        Ok(FacilitatorClient::verify(self, request).await?)
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorError> {
        Ok(FacilitatorClient::settle(self, request).await?)
    }

    async fn supported(&self) -> Result<SupportedResponse, FacilitatorError> {
        Ok(FacilitatorClient::supported(self).await?)
    }
}

#[async_trait::async_trait]
impl InvoiceIssuer for FacilitatorClient {
    async fn create_or_get_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<Invoice, FacilitatorError> {
        Ok(FacilitatorClient::create_or_get_invoice(self, request).await?)
    }
}

/// Parses a base URL, normalizing it to exactly one trailing slash.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}

/// Records the outcome of a request on the current span.
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}
