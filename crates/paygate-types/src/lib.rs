//! Core types for gating HTTP resources behind x402 payments.
//!
//! This crate holds everything the payment gate needs that does not depend on
//! a particular HTTP framework or payment rail.
//!
//! # Modules
//!
//! - [`chain`] - CAIP-2 style network identifiers
//! - [`config`] - Configuration values that may be resolved from the environment
//! - [`facilitator`] - Traits for the remote settlement authority (verify, settle, invoices)
//! - [`price`] - Human price expressions and asset amounts
//! - [`proto`] - Wire format types exchanged with callers and facilitators
//! - [`scheme`] - The payment scheme abstraction and its registry
//! - [`util`] - Base64 helpers used by the header codecs

pub mod chain;
pub mod config;
pub mod facilitator;
pub mod price;
pub mod proto;
pub mod scheme;
pub mod util;
