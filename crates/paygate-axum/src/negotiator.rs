//! Turns a route's payment options into the requirements shown to a caller.
//!
//! Options are resolved concurrently. Each one goes through registry lookup,
//! [`SchemeServer::parse_price`] and [`SchemeServer::enhance_requirements`];
//! an option that fails at any step is dropped and recorded as an
//! [`OptionFailure`], the rest are returned in the order the route author
//! listed them. Only when nothing survives does negotiation fail.

use futures_util::future::join_all;
use paygate_types::chain::ChainId;
use paygate_types::proto::{PaymentOption, PaymentRequirements};
use paygate_types::scheme::{NegotiationContext, SchemeError, SchemeRegistry, SchemeServer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a `/supported` lookup. On expiry the option is enhanced
/// without capabilities.
pub const SUPPORTED_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Why an option was left out.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionFailureReason {
    #[error("No scheme {scheme} registered for network {network}")]
    Unconfigured { scheme: String, network: ChainId },
    #[error(transparent)]
    Scheme(#[from] SchemeError),
    #[error("Requirements are not payable: amount {amount:?}, payTo {pay_to:?}")]
    NotPayable { amount: String, pay_to: String },
}

impl OptionFailureReason {
    /// Failures caused by the deployment rather than by a remote outage.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            OptionFailureReason::Unconfigured { .. } | OptionFailureReason::NotPayable { .. } => {
                true
            }
            OptionFailureReason::Scheme(err) => matches!(
                err,
                SchemeError::Parse(_)
                    | SchemeError::InvalidPrice(_)
                    | SchemeError::MissingMetadata(_)
                    | SchemeError::UnsupportedNetwork { .. }
                    | SchemeError::InvalidRecipient(_)
            ),
        }
    }
}

/// One excluded option. `index` is its position in the route's option list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionFailure {
    pub index: usize,
    pub scheme: String,
    pub network: ChainId,
    #[serde(serialize_with = "serialize_display")]
    pub reason: OptionFailureReason,
}

fn serialize_display<T: fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl fmt::Display for OptionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "option #{} ({}@{}): {}",
            self.index, self.scheme, self.network, self.reason
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NegotiationError {
    #[error("No viable payment options ({} failed)", .failures.len())]
    NoViableOptions { failures: Vec<OptionFailure> },
}

impl NegotiationError {
    pub fn failures(&self) -> &[OptionFailure] {
        match self {
            NegotiationError::NoViableOptions { failures } => failures,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RequirementsNegotiator {
    registry: Arc<SchemeRegistry>,
}

impl RequirementsNegotiator {
    pub fn new(registry: Arc<SchemeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    /// Resolves every option, keeping the survivors in author order.
    #[tracing::instrument(
        name = "paygate.negotiate",
        skip_all,
        fields(options = options.len(), payer = %ctx.payer)
    )]
    pub async fn negotiate(
        &self,
        ctx: &NegotiationContext,
        options: &[PaymentOption],
    ) -> Result<Vec<PaymentRequirements>, NegotiationError> {
        let attempts = options
            .iter()
            .enumerate()
            .map(|(index, option)| self.resolve(ctx, index, option));
        let results = join_all(attempts).await;

        let mut accepts = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(requirements) => accepts.push(requirements),
                Err(failure) => {
                    tracing::warn!(
                        index = failure.index,
                        scheme = %failure.scheme,
                        network = %failure.network,
                        reason = %failure.reason,
                        "Payment option excluded"
                    );
                    failures.push(failure);
                }
            }
        }

        if accepts.is_empty() {
            Err(NegotiationError::NoViableOptions { failures })
        } else {
            Ok(accepts)
        }
    }

    async fn resolve(
        &self,
        ctx: &NegotiationContext,
        index: usize,
        option: &PaymentOption,
    ) -> Result<PaymentRequirements, OptionFailure> {
        let fail = |reason: OptionFailureReason| OptionFailure {
            index,
            scheme: option.scheme.clone(),
            network: option.network.clone(),
            reason,
        };

        let entry = self
            .registry
            .get(&option.scheme, &option.network)
            .ok_or_else(|| {
                fail(OptionFailureReason::Unconfigured {
                    scheme: option.scheme.clone(),
                    network: option.network.clone(),
                })
            })?;
        let asset = entry
            .scheme
            .parse_price(&option.price, &option.network)
            .map_err(|e| fail(e.into()))?;

        let description = if option.description.is_empty() {
            ctx.resource.description.clone()
        } else {
            option.description.clone()
        };
        let requirements = PaymentRequirements {
            scheme: entry.scheme.scheme().to_string(),
            network: option.network.clone(),
            amount: asset.amount,
            pay_to: option.pay_to.clone(),
            asset: asset.asset,
            max_timeout_seconds: option.max_timeout_seconds,
            description,
            extra: asset.extra,
        };

        let supported = if entry.scheme.uses_supported_kinds() {
            let lookup = entry.facilitator.supported();
            match tokio::time::timeout(SUPPORTED_LOOKUP_TIMEOUT, lookup).await {
                Ok(Ok(supported)) => Some(supported),
                Ok(Err(err)) => {
                    tracing::debug!(error = %err, "Facilitator capabilities unavailable");
                    None
                }
                Err(_) => {
                    tracing::debug!(
                        timeout = ?SUPPORTED_LOOKUP_TIMEOUT,
                        "Facilitator capabilities timed out"
                    );
                    None
                }
            }
        } else {
            None
        };
        let supported_kind = supported
            .as_ref()
            .and_then(|s| s.find_kind(&requirements.scheme, &requirements.network));
        let extensions = supported
            .as_ref()
            .map(|s| s.extensions.as_slice())
            .unwrap_or_default();

        let enhanced = entry
            .scheme
            .enhance_requirements(ctx, requirements, supported_kind, extensions)
            .await
            .map_err(|e| fail(e.into()))?;

        if !enhanced.is_payable() {
            return Err(fail(OptionFailureReason::NotPayable {
                amount: enhanced.amount,
                pay_to: enhanced.pay_to,
            }));
        }
        Ok(enhanced)
    }
}
