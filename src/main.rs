//! x402 paygate demo seller.
//!
//! Sells a weather report over HTTP. Prices come from the `routes` table of the
//! config file; every priced route accepts all payment options it lists, such
//! as USDC on Base Sepolia next to Monero on stagenet.
//!
//! Endpoints:
//! - `GET /weather` – Priced by the route table
//! - `GET /health` – Always free
//!
//! This server includes:
//! - OpenTelemetry tracing via `TraceLayer`
//! - CORS support for cross-origin clients
//! - Graceful shutdown on SIGINT and SIGTERM
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` points at the JSON config file
//! - `HOST`, `PORT` control binding address
//! - `OTEL_*` variables enable tracing to systems like Honeycomb

mod config;
mod handlers;
mod schemes;
mod util;

use axum::http::Method;
use dotenvy::dotenv;
use paygate_axum::X402Middleware;
use std::net::SocketAddr;
use tower_http::cors;

use crate::config::Config;
use crate::util::{SigDown, Telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;

    let facilitators = schemes::facilitator_clients(config.facilitators())?;
    let registry = schemes::build_registry(config.schemes(), &facilitators)?;

    let mut x402 = X402Middleware::new(registry)
        .with_request_timeout(config.request_timeout())
        .with_payer_header(config.payer_header())
        .with_settlement_callback(handlers::settlement_logger());
    if let Some(base_url) = config.base_url() {
        x402 = x402.with_base_url(base_url.clone());
    }
    for route in config.routes().keys() {
        tracing::info!(route = %route, "Priced route");
    }

    let http_endpoints = handlers::routes()
        .layer(x402.with_routes(config.routes().clone()))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any)
                .expose_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;
    sig_down.recv().await;

    Ok(())
}
