//! Axum middleware that charges for HTTP routes with [x402](https://www.x402.org) payments.
//!
//! A route lists the payment options it accepts. On every request the
//! [`X402Middleware`] layer negotiates those options into concrete
//! requirements (asking each scheme, and for dynamic schemes its facilitator,
//! what exactly to pay), then verifies and settles the `X-PAYMENT` proof
//! before the protected handler runs.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, Json};
//! use axum::response::IntoResponse;
//! use http::StatusCode;
//! use paygate_axum::{FacilitatorClient, X402Middleware};
//! use paygate_chain_eip155::Eip155Exact;
//! use paygate_chain_monero::MoneroExact;
//! use paygate_types::chain::ChainId;
//! use paygate_types::proto::PaymentOption;
//! use paygate_types::scheme::SchemeRegistry;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let evm = Arc::new(FacilitatorClient::try_from("https://evm-facilitator.example.com/").unwrap());
//! let xmr = Arc::new(FacilitatorClient::try_from("https://xmr-facilitator.example.com/").unwrap());
//! let base_sepolia = ChainId::eip155(84532);
//! let stagenet = ChainId::monero("stagenet");
//!
//! let registry = SchemeRegistry::new()
//!     .and_register(base_sepolia.clone(), Arc::new(Eip155Exact::new()), evm)
//!     .and_register(stagenet.clone(), Arc::new(MoneroExact::new(xmr.clone())), xmr);
//! let x402 = X402Middleware::new(registry);
//!
//! let app: Router = Router::new().route(
//!     "/paywall",
//!     get(my_handler).layer(
//!         x402.with_option(PaymentOption::new("exact", base_sepolia, "0xADDRESS", "$0.025"))
//!             .with_option(PaymentOption::new("exact", stagenet, "", "$0.025"))
//!             .with_description("Premium Content"),
//!     ),
//! );
//!
//! async fn my_handler() -> impl IntoResponse {
//!     (StatusCode::OK, Json(json!({ "hello": "world" })))
//! }
//! ```
//! See [`X402Middleware`] for full configuration options, and [`routes`] for
//! pricing a whole router from configuration.
//! For low-level interaction with the facilitator, see [`facilitator_client::FacilitatorClient`].

pub mod facilitator_client;
pub mod layer;
pub mod negotiator;
pub mod paygate;
pub mod routes;

#[cfg(test)]
mod test_support;

pub use facilitator_client::FacilitatorClient;
pub use layer::X402Middleware;
pub use negotiator::{NegotiationError, OptionFailure, RequirementsNegotiator};
pub use paygate::{PaygateError, SettlementCallback};
pub use routes::{RouteConfig, RoutesConfig};
