//! Base64 helpers for the payment headers.
//!
//! Payment proofs arrive in `X-PAYMENT` and settlement receipts leave in
//! `X-PAYMENT-RESPONSE`, both as base64 encoded JSON.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt;

/// Bytes that hold base64 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        Base64Bytes(Cow::Owned(b64.encode(input.as_ref()).into_bytes()))
    }

    /// Serializes `value` as JSON and encodes the result.
    pub fn encode_json<T: Serialize>(value: &T) -> Result<Base64Bytes<'static>, serde_json::Error> {
        serde_json::to_vec(value).map(Self::encode)
    }

    /// Decodes base64, then parses the bytes as JSON. `None` on either failure.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Option<T> {
        let bytes = self.decode().ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl fmt::Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}
