//! Configuration values that can point at the environment.
//!
//! Facilitator URLs, bearer tokens and recipient addresses usually differ per
//! deployment and some of them are secrets. [`LiteralOrEnv`] lets a JSON
//! config file either spell the value out or reference an environment
//! variable:
//!
//! ```json
//! {
//!   "url": "https://facilitator.example/",
//!   "bearerToken": "$FACILITATOR_TOKEN",
//!   "payTo": "${EVM_PAY_TO}"
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// A value given literally or as `$VAR` / `${VAR}`, resolved when deserialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Name of the referenced variable, if `raw` uses `$VAR` or `${VAR}` syntax.
fn env_reference(raw: &str) -> Option<&str> {
    if let Some(braced) = raw.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        return Some(braced);
    }
    let name = raw.strip_prefix('$')?;
    let is_identifier =
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_identifier.then_some(name)
}

/// Resolves `raw` against the process environment.
fn resolve(raw: String) -> Result<String, String> {
    match env_reference(&raw) {
        Some(name) => std::env::var(name)
            .map_err(|_| format!("Environment variable '{name}' not found (referenced as '{raw}')")),
        None => Ok(raw),
    }
}

/// `deserialize_with` helper for plain fields that accept `$VAR` references.
pub fn literal_or_env<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    LiteralOrEnv::<T>::deserialize(deserializer).map(LiteralOrEnv::into_inner)
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: fmt::Display> fmt::Display for LiteralOrEnv<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let value = resolve(raw).map_err(serde::de::Error::custom)?;
        value
            .parse::<T>()
            .map(LiteralOrEnv)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {e}")))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_env_reference_syntax() {
        assert_eq!(env_reference("$TOKEN"), Some("TOKEN"));
        assert_eq!(env_reference("${FACILITATOR_URL}"), Some("FACILITATOR_URL"));
        assert_eq!(env_reference("$"), None);
        assert_eq!(env_reference("$0.01"), None);
        assert_eq!(env_reference("https://example.com"), None);
    }

    #[test]
    fn test_literal_value() {
        let url: LiteralOrEnv<Url> = serde_json::from_str("\"https://x402.org/facilitator\"").unwrap();
        assert_eq!(url.host_str(), Some("x402.org"));
    }

    #[test]
    fn test_env_value() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("PAYGATE_TEST_BEARER_TOKEN", "secret-token") };
        let token: LiteralOrEnv<String> =
            serde_json::from_str("\"${PAYGATE_TEST_BEARER_TOKEN}\"").unwrap();
        assert_eq!(token.inner(), "secret-token");
    }

    #[test]
    fn test_missing_env_value() {
        let result: Result<LiteralOrEnv<String>, _> =
            serde_json::from_str("\"$PAYGATE_TEST_SURELY_UNSET_VARIABLE\"");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("PAYGATE_TEST_SURELY_UNSET_VARIABLE"));
    }
}
