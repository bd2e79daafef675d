//! Network identifiers.
//!
//! Every payment option, requirement and proof names the network it settles on
//! with a CAIP-2 style identifier: `namespace:reference`. The namespace selects
//! the payment rail family (`eip155` for EVM chains, `monero` for Monero), the
//! reference selects the concrete network within it.
//!
//! ```
//! use paygate_types::chain::ChainId;
//!
//! let stagenet: ChainId = "monero:stagenet".parse().unwrap();
//! assert_eq!(stagenet.namespace(), "monero");
//! assert_eq!(stagenet.reference(), "stagenet");
//! assert_eq!(stagenet.to_string(), "monero:stagenet");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// Namespace of EVM networks, as in `eip155:8453`.
pub const EIP155_NAMESPACE: &str = "eip155";

/// Namespace of Monero networks, as in `monero:mainnet`.
pub const MONERO_NAMESPACE: &str = "monero";

/// A CAIP-2 style network identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// EVM network by numeric chain id.
    pub fn eip155(chain_id: u64) -> Self {
        Self::new(EIP155_NAMESPACE, chain_id.to_string())
    }

    /// Monero network by name (`mainnet`, `stagenet`, `testnet`).
    pub fn monero<R: Into<String>>(network: R) -> Self {
        Self::new(MONERO_NAMESPACE, network)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Returned when a string is not of the `namespace:reference` form.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, reference)) if !namespace.is_empty() && !reference.is_empty() => {
                Ok(ChainId::new(namespace, reference))
            }
            _ => Err(ChainIdFormatError(s.into())),
        }
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(de::Error::custom)
    }
}
