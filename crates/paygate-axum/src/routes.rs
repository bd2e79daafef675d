//! Route table: which `(method, path)` costs what.
//!
//! ```json
//! {
//!   "GET /weather": {
//!     "description": "Current weather",
//!     "accepts": [
//!       { "scheme": "exact", "network": "eip155:84532", "payTo": "$EVM_PAY_TO", "price": "$0.001" },
//!       { "scheme": "exact", "network": "monero:stagenet", "price": "$0.001" }
//!     ]
//!   }
//! }
//! ```

use http::Method;
use paygate_types::proto::PaymentOption;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::paygate::ResourceInfoBuilder;

/// Payment terms of one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Accepted options, most preferred first.
    pub accepts: Vec<PaymentOption>,
    #[serde(flatten)]
    pub resource: ResourceInfoBuilder,
}

impl RouteConfig {
    pub fn new(accepts: Vec<PaymentOption>) -> Self {
        Self {
            accepts,
            resource: ResourceInfoBuilder::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteKeyError {
    #[error("Route key {0:?} must look like \"GET /path\"")]
    Format(String),
    #[error("Invalid HTTP method in route key {0:?}")]
    Method(String),
}

/// `"GET /weather"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: Method,
    pub path: String,
}

impl RouteKey {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

impl FromStr for RouteKey {
    type Err = RouteKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, path) = s
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| RouteKeyError::Format(s.to_string()))?;
        let path = path.trim();
        if !path.starts_with('/') {
            return Err(RouteKeyError::Format(s.to_string()));
        }
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| RouteKeyError::Method(s.to_string()))?;
        Ok(RouteKey::new(method, path))
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Priced routes, built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "HashMap<String, RouteConfig>")]
pub struct RoutesConfig(HashMap<RouteKey, Arc<RouteConfig>>);

impl TryFrom<HashMap<String, RouteConfig>> for RoutesConfig {
    type Error = RouteKeyError;

    fn try_from(raw: HashMap<String, RouteConfig>) -> Result<Self, Self::Error> {
        let mut routes = HashMap::with_capacity(raw.len());
        for (key, route) in raw {
            routes.insert(key.parse::<RouteKey>()?, Arc::new(route));
        }
        Ok(RoutesConfig(routes))
    }
}

impl RoutesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and_route(mut self, key: RouteKey, route: RouteConfig) -> Self {
        self.0.insert(key, Arc::new(route));
        self
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Option<Arc<RouteConfig>> {
        self.0
            .get(&RouteKey::new(method.clone(), path))
            .cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_types::chain::ChainId;
    use serde_json::json;

    #[test]
    fn test_route_key() {
        let key: RouteKey = "get  /weather".parse().unwrap();
        assert_eq!(key.method, Method::GET);
        assert_eq!(key.path, "/weather");
        assert_eq!(key.to_string(), "GET /weather");
        assert!("/weather".parse::<RouteKey>().is_err());
        assert!("GET weather".parse::<RouteKey>().is_err());
    }

    #[test]
    fn test_routes_from_json() {
        let routes: RoutesConfig = serde_json::from_value(json!({
            "GET /weather": {
                "description": "Current weather",
                "accepts": [
                    { "scheme": "exact", "network": "eip155:84532", "payTo": "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045", "price": "$0.001" },
                    { "scheme": "exact", "network": "monero:stagenet", "price": "$0.001" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(routes.len(), 1);
        let route = routes.lookup(&Method::GET, "/weather").unwrap();
        assert_eq!(route.accepts.len(), 2);
        assert_eq!(route.accepts[1].network, ChainId::monero("stagenet"));
        assert_eq!(route.accepts[1].pay_to, "");
        assert_eq!(route.resource.description, "Current weather");
        assert_eq!(route.resource.mime_type, "application/json");
        assert!(routes.lookup(&Method::POST, "/weather").is_none());
        assert!(routes.lookup(&Method::GET, "/health").is_none());
    }

    #[test]
    fn test_bad_route_key_is_rejected() {
        let result = serde_json::from_value::<RoutesConfig>(json!({
            "weather": { "accepts": [] }
        }));
        assert!(result.is_err());
    }
}
