//! Configuration for the paygate demo seller.

use clap::Parser;
use paygate_axum::RoutesConfig;
use paygate_types::chain::ChainId;
use paygate_types::config::LiteralOrEnv;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// CLI arguments for the paygate demo seller.
#[derive(Parser, Debug)]
#[command(name = "x402-paygate")]
#[command(about = "HTTP server selling routes for x402 payments")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    base_url: Option<LiteralOrEnv<Url>>,
    #[serde(default = "config_defaults::default_request_timeout_seconds")]
    request_timeout_seconds: u64,
    #[serde(default = "config_defaults::default_payer_header")]
    payer_header: String,
    #[serde(default)]
    facilitators: HashMap<String, FacilitatorConfig>,
    #[serde(default)]
    schemes: Vec<SchemeConfig>,
    #[serde(default)]
    routes: RoutesConfig,
}

/// A remote facilitator, referenced by name from [`SchemeConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorConfig {
    pub url: LiteralOrEnv<Url>,
    #[serde(default)]
    pub bearer_token: Option<LiteralOrEnv<String>>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub invoice_timeout_seconds: Option<u64>,
    /// `0` disables the `/supported` cache.
    #[serde(default)]
    pub supported_cache_seconds: Option<u64>,
}

/// One scheme enabled on one network.
///
/// ```json
/// { "id": "v2-monero-exact", "network": "monero:stagenet", "facilitator": "xmr", "requirePayerIdentity": true }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeConfig {
    pub id: String,
    pub network: ChainId,
    pub facilitator: String,
    #[serde(default)]
    pub require_payer_identity: bool,
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 120;
    pub const DEFAULT_PAYER_HEADER: &str = "X-PAYER";

    /// Returns the default port value with fallback: $PORT env var -> 3000
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn default_request_timeout_seconds() -> u64 {
        DEFAULT_REQUEST_TIMEOUT_SECONDS
    }

    pub fn default_payer_header() -> String {
        DEFAULT_PAYER_HEADER.to_string()
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Scheme {scheme} on {network} references unknown facilitator {facilitator:?}")]
    UnknownFacilitator {
        scheme: String,
        network: ChainId,
        facilitator: String,
    },
    #[error("Unknown scheme id {0:?}")]
    UnknownScheme(String),
    #[error("Invalid facilitator {name:?}: {message}")]
    Facilitator { name: String, message: String },
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref().map(|url| url.inner())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn payer_header(&self) -> &str {
        &self.payer_header
    }

    pub fn facilitators(&self) -> &HashMap<String, FacilitatorConfig> {
        &self.facilitators
    }

    pub fn schemes(&self) -> &[SchemeConfig] {
        &self.schemes
    }

    pub fn routes(&self) -> &RoutesConfig {
        &self.routes
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument or `$CONFIG`
    /// 2. `./config.json`
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        Self::from_json(&content)
    }

    fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        Ok(config)
    }
}
