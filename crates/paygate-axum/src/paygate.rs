//! Per-request payment gate.
//!
//! A [`Paygate`] walks one request through
//! `Unchecked -> Negotiated -> (Insufficient | Verified) -> Settled -> Forwarded`:
//!
//! 1. negotiate requirements for the route ([`RequirementsNegotiator`]);
//! 2. read the `X-PAYMENT` proof and match it to a negotiated requirement;
//! 3. verify the proof with the facilitator of that requirement;
//! 4. settle it;
//! 5. call the protected handler, attach `X-PAYMENT-RESPONSE`, notify the
//!    settlement callback.
//!
//! Steps 1 to 4 share one deadline. The handler runs outside it.
//!
//! | Outcome                                        | Status |
//! |------------------------------------------------|--------|
//! | no viable payment option                       | 500    |
//! | no proof, bad proof, unmatched or invalid proof| 402    |
//! | settlement failed or could not be reached      | 502    |
//! | facilitator answered nonsense                  | 500    |
//! | deadline exceeded                              | 504    |

use axum_core::body::Body;
use axum_core::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode, Uri};
use paygate_types::facilitator::FacilitatorError;
use paygate_types::proto::{
    PaymentOption, PaymentPayload, PaymentRequired, PaymentRequirements, ResourceInfo,
    SettleResponse, VerifyRequest, X402Version2,
};
use paygate_types::scheme::{NegotiationContext, PayerId};
use paygate_types::util::Base64Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tower::{Service, ServiceExt};
use tracing::{Instrument, instrument};
use url::Url;

use crate::negotiator::{NegotiationError, RequirementsNegotiator};

pub const PAYMENT_HEADER: &str = "X-PAYMENT";
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";
pub const DEFAULT_PAYER_HEADER: &str = "X-PAYER";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Called once per successful settlement, after the handler has run.
/// Errors are logged and never change the response.
pub type SettlementCallback = Arc<dyn Fn(&SettleResponse) -> Result<(), BoxError> + Send + Sync>;

/// How a protected resource describes itself in 402 responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfoBuilder {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Explicit resource URL. Derived from the base URL and request URI when absent.
    #[serde(default, rename = "resource")]
    pub url: Option<String>,
}

fn default_mime_type() -> String {
    "application/json".to_string()
}

impl Default for ResourceInfoBuilder {
    fn default() -> Self {
        Self {
            description: String::new(),
            mime_type: default_mime_type(),
            url: None,
        }
    }
}

impl ResourceInfoBuilder {
    /// Falls back to `http://localhost/` when no base URL is given.
    pub fn as_resource_info(&self, base_url: Option<&Url>, request_uri: &Uri) -> ResourceInfo {
        ResourceInfo {
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            url: self.url.clone().unwrap_or_else(|| {
                let mut url = base_url.unwrap_or(&LOCALHOST).clone();
                url.set_path(request_uri.path());
                url.set_query(request_uri.query());
                url.to_string()
            }),
        }
    }
}

static LOCALHOST: LazyLock<Url> =
    LazyLock::new(|| Url::parse("http://localhost/").expect("static localhost URL is valid"));

#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("{0} header is required")]
    PaymentHeaderRequired(&'static str),
    #[error("Invalid or malformed payment header")]
    InvalidPaymentHeader,
    #[error("Unable to find matching payment requirements")]
    NoPaymentMatching,
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
    #[error("Settlement failed: {0}")]
    Settlement(String),
    #[error(transparent)]
    FacilitatorProtocol(FacilitatorError),
    #[error("Payment processing exceeded {0:?}")]
    Timeout(Duration),
}

impl PaygateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaygateError::PaymentHeaderRequired(_)
            | PaygateError::InvalidPaymentHeader
            | PaygateError::NoPaymentMatching
            | PaygateError::VerificationFailed(_) => StatusCode::PAYMENT_REQUIRED,
            PaygateError::Settlement(_) => StatusCode::BAD_GATEWAY,
            PaygateError::Negotiation(_) | PaygateError::FacilitatorProtocol(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PaygateError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Verify-time failures mean "not paid yet"; a protocol mismatch does not.
    fn from_verify(err: FacilitatorError) -> Self {
        match err {
            FacilitatorError::Protocol { .. } => PaygateError::FacilitatorProtocol(err),
            FacilitatorError::Unavailable { .. } => PaygateError::VerificationFailed(err.to_string()),
        }
    }

    /// Settle-time failures stay errors: the caller already proved payment.
    fn from_settle(err: FacilitatorError) -> Self {
        match err {
            FacilitatorError::Protocol { .. } => PaygateError::FacilitatorProtocol(err),
            FacilitatorError::Unavailable { .. } => PaygateError::Settlement(err.to_string()),
        }
    }
}

/// A failed authorization, with the requirements a 402 should list.
struct Rejection {
    error: PaygateError,
    accepts: Vec<PaymentRequirements>,
}

impl From<PaygateError> for Rejection {
    fn from(error: PaygateError) -> Self {
        Rejection {
            error,
            accepts: Vec::new(),
        }
    }
}

/// Payment gate for a single request.
pub struct Paygate {
    pub negotiator: RequirementsNegotiator,
    pub options: Arc<Vec<PaymentOption>>,
    pub resource: ResourceInfo,
    pub payer: PayerId,
    pub timeout: Duration,
    pub settlement_callback: Option<SettlementCallback>,
}

impl Paygate {
    /// Handles a request, always producing a response.
    #[instrument(
        name = "paygate.handle_request",
        skip_all,
        fields(resource = %self.resource.url, payer = %self.payer)
    )]
    pub async fn handle_request<S>(self, inner: S, req: http::Request<Body>) -> Result<Response, Infallible>
    where
        S: Service<http::Request<Body>, Response = Response, Error = Infallible> + Send,
        S::Future: Send,
    {
        let proof = req.headers().get(PAYMENT_HEADER).map(|h| h.as_bytes().to_vec());
        let authorized = tokio::time::timeout(self.timeout, self.authorize(proof.as_deref())).await;
        let settlement = match authorized {
            Ok(Ok(settlement)) => settlement,
            Ok(Err(rejection)) => return Ok(self.reject(rejection)),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Payment processing timed out");
                return Ok(self.reject(PaygateError::Timeout(self.timeout).into()));
            }
        };

        let mut response = match inner.oneshot(req).instrument(tracing::info_span!("inner")).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };
        match Base64Bytes::encode_json(&settlement)
            .map_err(|e| e.to_string())
            .and_then(|encoded| HeaderValue::from_bytes(encoded.as_ref()).map_err(|e| e.to_string()))
        {
            Ok(value) => {
                response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
            }
            Err(err) => tracing::error!(error = %err, "Failed to encode settlement header"),
        }
        self.notify(&settlement);
        Ok(response)
    }

    /// Negotiation, verification and settlement.
    async fn authorize(&self, proof: Option<&[u8]>) -> Result<SettleResponse, Rejection> {
        let ctx = NegotiationContext::new(self.payer.clone(), self.resource.clone());
        let accepts = self
            .negotiator
            .negotiate(&ctx, &self.options)
            .await
            .map_err(|e| Rejection::from(PaygateError::from(e)))?;
        match self.verify_and_settle(&accepts, proof).await {
            Ok(settlement) => Ok(settlement),
            Err(error) => Err(Rejection { error, accepts }),
        }
    }

    async fn verify_and_settle(
        &self,
        accepts: &[PaymentRequirements],
        proof: Option<&[u8]>,
    ) -> Result<SettleResponse, PaygateError> {
        let proof = proof.ok_or(PaygateError::PaymentHeaderRequired(PAYMENT_HEADER))?;
        let payload: PaymentPayload = Base64Bytes::from(proof)
            .decode_json()
            .ok_or(PaygateError::InvalidPaymentHeader)?;
        let selected = select_requirements(accepts, &payload.accepted)
            .ok_or(PaygateError::NoPaymentMatching)?;
        let entry = self
            .negotiator
            .registry()
            .get(&selected.scheme, &selected.network)
            .ok_or(PaygateError::NoPaymentMatching)?;

        let request = VerifyRequest {
            x402_version: X402Version2,
            payment_payload: payload,
            payment_requirements: selected.clone(),
        };

        let verification = entry
            .facilitator
            .verify(&request)
            .await
            .map_err(PaygateError::from_verify)?;
        if !verification.is_valid {
            let reason = verification
                .invalid_reason
                .unwrap_or_else(|| "invalid payment".to_string());
            return Err(PaygateError::VerificationFailed(reason));
        }
        tracing::debug!(network = %selected.network, "Payment verified, settling");

        let mut settlement = entry
            .facilitator
            .settle(&request)
            .await
            .map_err(PaygateError::from_settle)?;
        if !settlement.success {
            let reason = settlement
                .error_reason
                .unwrap_or_else(|| "facilitator reported failure".to_string());
            return Err(PaygateError::Settlement(reason));
        }
        if settlement.payer.is_none() {
            settlement.payer = Some(
                verification
                    .payer
                    .unwrap_or_else(|| self.payer.to_string()),
            );
        }
        if settlement.network.is_empty() {
            settlement.network = selected.network.to_string();
        }
        Ok(settlement)
    }

    fn notify(&self, settlement: &SettleResponse) {
        let Some(callback) = &self.settlement_callback else {
            return;
        };
        if let Err(err) = callback(settlement) {
            tracing::error!(
                error = %err,
                transaction = %settlement.transaction,
                "Settlement callback failed"
            );
        }
    }

    fn reject(&self, rejection: Rejection) -> Response {
        let Rejection { error, accepts } = rejection;
        let status = error.status_code();
        match &error {
            PaygateError::Negotiation(err) => {
                tracing::error!(error = %err, "Payment negotiation failed");
                json_response(
                    status,
                    &json!({ "error": err.to_string(), "failures": err.failures() }),
                )
            }
            PaygateError::Settlement(details) => json_response(
                status,
                &json!({ "error": "Settlement failed", "details": details, "retryable": true }),
            ),
            PaygateError::FacilitatorProtocol(err) => json_response(
                status,
                &json!({ "error": "Facilitator protocol error", "details": err.to_string() }),
            ),
            PaygateError::Timeout(_) => json_response(
                status,
                &json!({ "error": "Payment processing timed out", "details": error.to_string(), "retryable": true }),
            ),
            PaygateError::PaymentHeaderRequired(_)
            | PaygateError::InvalidPaymentHeader
            | PaygateError::NoPaymentMatching
            | PaygateError::VerificationFailed(_) => {
                let payment_required = PaymentRequired {
                    x402_version: X402Version2,
                    error: Some(error.to_string()),
                    resource: self.resource.clone(),
                    accepts,
                };
                json_response(status, &payment_required)
            }
        }
    }
}

/// The requirement a proof pays for: an exact echo of a negotiated one, else
/// the first one with the same scheme and network.
fn select_requirements<'a>(
    accepts: &'a [PaymentRequirements],
    accepted: &PaymentRequirements,
) -> Option<&'a PaymentRequirements> {
    accepts
        .iter()
        .find(|requirements| *requirements == accepted)
        .or_else(|| {
            accepts
                .iter()
                .find(|requirements| requirements.matches(&accepted.scheme, &accepted.network))
        })
}

/// Reads the payer identity hint from `header_name`.
pub fn payer_from_headers(headers: &HeaderMap, header_name: &str) -> PayerId {
    PayerId::from_header_value(headers.get(header_name).and_then(|v| v.to_str().ok()))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Body::from(bytes).into_response();
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
