//! Monero support for the payment gate.
//!
//! [`MoneroExact`] delegates address minting and USD to XMR conversion to a
//! facilitator that implements [`paygate_types::facilitator::InvoiceIssuer`].

pub mod exact;

pub use exact::{MoneroExact, bucket_key};
