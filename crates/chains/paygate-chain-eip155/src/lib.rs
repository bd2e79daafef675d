//! EVM support for the payment gate.
//!
//! [`Eip155Exact`] prices routes in USDC (or any configured token) with a fixed
//! USD conversion:
//!
//! ```
//! use paygate_chain_eip155::Eip155Exact;
//! use paygate_types::chain::ChainId;
//! use paygate_types::scheme::SchemeServer;
//!
//! let scheme = Eip155Exact::new();
//! let asset = scheme.parse_price("$0.001", &ChainId::eip155(84532)).unwrap();
//! assert_eq!(asset.amount, "1000");
//! ```

pub mod exact;
pub mod networks;

pub use exact::Eip155Exact;
pub use networks::{TokenDeployment, TokenDeploymentEip712, USDC};
