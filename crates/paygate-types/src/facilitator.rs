//! The remote settlement authority.
//!
//! A facilitator verifies payment proofs, settles them, advertises what it
//! supports, and for address-rotation rails issues invoices. The gate only
//! talks to it through these traits, so tests and alternative transports can
//! stand in for the HTTP client.

use std::sync::Arc;

use crate::proto::{
    CreateInvoiceRequest, Invoice, SettleRequest, SettleResponse, SupportedResponse, VerifyRequest,
    VerifyResponse,
};

/// Failure talking to a facilitator, classified by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FacilitatorError {
    /// Transport failure, timeout or non-success status.
    #[error("Facilitator unavailable: {context}: {message}")]
    Unavailable {
        context: &'static str,
        message: String,
    },
    /// The facilitator answered with something this client does not understand.
    #[error("Facilitator protocol error: {context}: {message}")]
    Protocol {
        context: &'static str,
        message: String,
    },
}

impl FacilitatorError {
    pub fn unavailable<M: ToString>(context: &'static str, message: M) -> Self {
        Self::Unavailable {
            context,
            message: message.to_string(),
        }
    }

    pub fn protocol<M: ToString>(context: &'static str, message: M) -> Self {
        Self::Protocol {
            context,
            message: message.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[async_trait::async_trait]
pub trait Facilitator: Send + Sync {
    /// Checks a proof against requirements without moving funds.
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError>;

    /// Finalizes a verified payment.
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorError>;

    /// Lists supported scheme/network pairs and extensions.
    async fn supported(&self) -> Result<SupportedResponse, FacilitatorError>;
}

/// Issues invoices with one-time recipient addresses.
#[async_trait::async_trait]
pub trait InvoiceIssuer: Send + Sync {
    /// Returns the open invoice for `request.metadata`, creating one if none exists.
    async fn create_or_get_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<Invoice, FacilitatorError>;
}

#[async_trait::async_trait]
impl<T: Facilitator + ?Sized> Facilitator for Arc<T> {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError> {
        (**self).verify(request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorError> {
        (**self).settle(request).await
    }

    async fn supported(&self) -> Result<SupportedResponse, FacilitatorError> {
        (**self).supported().await
    }
}

#[async_trait::async_trait]
impl<T: InvoiceIssuer + ?Sized> InvoiceIssuer for Arc<T> {
    async fn create_or_get_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<Invoice, FacilitatorError> {
        (**self).create_or_get_invoice(request).await
    }
}
