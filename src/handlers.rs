//! HTTP endpoints of the demo seller.
//!
//! `GET /weather` is the product; whether it costs anything is decided by the
//! route table the payment layer is built from. `GET /health` is always free.

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use paygate_axum::SettlementCallback;
use paygate_axum::paygate::BoxError;
use paygate_types::proto::SettleResponse;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

pub fn routes() -> Router {
    Router::new()
        .route("/weather", get(get_weather))
        .route("/health", get(get_health))
}

/// `GET /weather`: the paid resource.
#[instrument(skip_all)]
pub async fn get_weather() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "report": {
                "weather": "sunny",
                "temperature": 70,
            }
        })),
    )
}

/// `GET /health`: liveness check.
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Logs every settlement and counts it as the `paygate.settlements` metric.
pub fn settlement_logger() -> SettlementCallback {
    Arc::new(|settlement: &SettleResponse| -> Result<(), BoxError> {
        tracing::info!(
            monotonic_counter.paygate.settlements = 1_u64,
            network = %settlement.network,
            transaction = %settlement.transaction,
            payer = settlement.payer.as_deref().unwrap_or("unknown"),
            "Payment settled"
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_free_routes() {
        let response = routes()
            .oneshot(axum::http::Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = routes()
            .oneshot(axum::http::Request::get("/weather").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["report"]["weather"], "sunny");
    }

    #[test]
    fn test_settlement_logger_accepts_every_settlement() {
        let callback = settlement_logger();
        let settlement = SettleResponse {
            success: true,
            error_reason: None,
            transaction: "0xabc".into(),
            network: "monero:stagenet".into(),
            payer: None,
        };
        assert!(callback(&settlement).is_ok());
    }
}
