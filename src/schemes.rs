//! Builds the [`SchemeRegistry`] from configuration.
//!
//! Scheme ids name a scheme implementation and the protocol version it speaks:
//!
//! | id                | implementation                         |
//! |-------------------|----------------------------------------|
//! | `v2-eip155-exact` | [`Eip155Exact`], USDC at a fixed rate  |
//! | `v2-monero-exact` | [`MoneroExact`], one invoice per bucket |

use paygate_axum::FacilitatorClient;
use paygate_axum::facilitator_client::FacilitatorClientError;
use paygate_chain_eip155::Eip155Exact;
use paygate_chain_monero::MoneroExact;
use paygate_types::scheme::{SchemeRegistry, SchemeServer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigError, FacilitatorConfig, SchemeConfig};

pub const V2_EIP155_EXACT: &str = "v2-eip155-exact";
pub const V2_MONERO_EXACT: &str = "v2-monero-exact";

/// One client per configured facilitator, shared by every scheme that uses it.
pub fn facilitator_clients(
    configs: &HashMap<String, FacilitatorConfig>,
) -> Result<HashMap<String, Arc<FacilitatorClient>>, ConfigError> {
    let mut clients = HashMap::with_capacity(configs.len());
    for (name, config) in configs {
        let client = facilitator_client(config).map_err(|e| ConfigError::Facilitator {
            name: name.clone(),
            message: e.to_string(),
        })?;
        tracing::info!(facilitator = %name, url = %client.base_url(), "Using facilitator");
        clients.insert(name.clone(), Arc::new(client));
    }
    Ok(clients)
}

fn facilitator_client(config: &FacilitatorConfig) -> Result<FacilitatorClient, FacilitatorClientError> {
    let mut client = FacilitatorClient::try_from(config.url.inner().as_str())?;
    if let Some(token) = &config.bearer_token {
        client = client.with_bearer_token(token.inner())?;
    }
    if let Some(seconds) = config.timeout_seconds {
        client = client.with_timeout(Duration::from_secs(seconds));
    }
    if let Some(seconds) = config.invoice_timeout_seconds {
        client = client.with_invoice_timeout(Duration::from_secs(seconds));
    }
    match config.supported_cache_seconds {
        Some(0) => client = client.without_supported_cache(),
        Some(seconds) => client = client.with_supported_cache_ttl(Duration::from_secs(seconds)),
        None => {}
    }
    Ok(client)
}

pub fn build_registry(
    schemes: &[SchemeConfig],
    facilitators: &HashMap<String, Arc<FacilitatorClient>>,
) -> Result<SchemeRegistry, ConfigError> {
    let mut registry = SchemeRegistry::new();
    for config in schemes {
        let facilitator =
            facilitators
                .get(&config.facilitator)
                .ok_or_else(|| ConfigError::UnknownFacilitator {
                    scheme: config.id.clone(),
                    network: config.network.clone(),
                    facilitator: config.facilitator.clone(),
                })?;
        let scheme: Arc<dyn SchemeServer> = match config.id.as_str() {
            V2_EIP155_EXACT => Arc::new(Eip155Exact::new()),
            V2_MONERO_EXACT => Arc::new(
                MoneroExact::new(facilitator.clone())
                    .require_payer_identity(config.require_payer_identity),
            ),
            other => return Err(ConfigError::UnknownScheme(other.to_string())),
        };
        registry.register(config.network.clone(), scheme, facilitator.clone());
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_types::chain::ChainId;

    fn clients() -> HashMap<String, Arc<FacilitatorClient>> {
        let client = FacilitatorClient::try_from("https://xmr.example.com/").unwrap();
        HashMap::from([("xmr".to_string(), Arc::new(client))])
    }

    fn scheme(id: &str, network: ChainId, facilitator: &str) -> SchemeConfig {
        SchemeConfig {
            id: id.into(),
            network,
            facilitator: facilitator.into(),
            require_payer_identity: false,
        }
    }

    #[test]
    fn test_build_registry() {
        let registry = build_registry(
            &[
                scheme(V2_EIP155_EXACT, ChainId::eip155(84532), "xmr"),
                scheme(V2_MONERO_EXACT, ChainId::monero("stagenet"), "xmr"),
            ],
            &clients(),
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("exact", &ChainId::monero("stagenet")).is_some());
        assert!(registry.get("exact", &ChainId::eip155(84532)).is_some());
    }

    #[test]
    fn test_unknown_references() {
        let err = build_registry(
            &[scheme(V2_MONERO_EXACT, ChainId::monero("stagenet"), "evm")],
            &clients(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFacilitator { .. }));

        let err = build_registry(
            &[scheme("v2-monero-upto", ChainId::monero("stagenet"), "xmr")],
            &clients(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownScheme(id) if id == "v2-monero-upto"));
    }

    #[test]
    fn test_facilitator_clients_from_config() {
        let configs: HashMap<String, FacilitatorConfig> = serde_json::from_str(
            r#"{ "xmr": { "url": "https://xmr.example.com/api", "invoiceTimeoutSeconds": 3, "supportedCacheSeconds": 0 } }"#,
        )
        .unwrap();
        let clients = facilitator_clients(&configs).unwrap();
        let xmr = &clients["xmr"];
        assert_eq!(xmr.base_url().as_str(), "https://xmr.example.com/api/");
        assert_eq!(xmr.invoice_timeout(), Duration::from_secs(3));
    }
}
