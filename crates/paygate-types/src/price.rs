//! Human price expressions.
//!
//! Route authors price resources in fiat terms, e.g. `"$0.001"`. Schemes turn
//! that into an [`AssetAmount`] on their rail, either right away (fixed
//! conversion into a stablecoin) or later during enhancement (external rate
//! lookup).
//!
//! ```
//! use paygate_types::price::{Currency, PriceSpec};
//!
//! let price = PriceSpec::parse("$0.001").unwrap();
//! assert_eq!(price.currency(), Currency::Usd);
//! assert_eq!(price.nominal(), "0.001");
//! assert_eq!(price.amount().to_token_units(6).unwrap(), "1000");
//! ```

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Thousands separators and whitespace accepted inside a number.
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,_\s]+").expect("valid separator regex"));

mod constants {
    use super::*;

    pub const MIN_STR: &str = "0.000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

/// A non-negative decimal amount that keeps the precision it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoneyAmount(pub Decimal);

/// Errors produced while reading a price expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Invalid number format")]
    InvalidFormat,
    #[error("Amount must be between {} and {}", constants::MIN_STR, constants::MAX_STR)]
    OutOfRange,
    #[error("Negative value is not allowed")]
    Negative,
    #[error("Too big of a precision: {money} vs {token} on token")]
    WrongPrecision { money: u32, token: u32 },
    #[error("Unsupported currency {0}")]
    UnsupportedCurrency(String),
}

impl MoneyAmount {
    /// Parses a bare number. Separators and whitespace are ignored, currency
    /// markers are not; see [`PriceSpec::parse`] for those.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = SEPARATORS.replace_all(input, "");
        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;
        if parsed.is_sign_negative() && !parsed.is_zero() {
            return Err(MoneyAmountParseError::Negative);
        }
        if parsed < *constants::MIN || parsed > *constants::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }
        Ok(MoneyAmount(parsed.normalize()))
    }

    /// Number of fractional digits, trailing zeros excluded.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// The digits without the decimal point: `12.34` gives `1234`.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    /// Expresses the amount in the smallest unit of a token with `decimals`
    /// fractional digits.
    pub fn to_token_units(&self, decimals: u32) -> Result<String, MoneyAmountParseError> {
        let scale = self.scale();
        if scale > decimals {
            return Err(MoneyAmountParseError::WrongPrecision {
                money: scale,
                token: decimals,
            });
        }
        10u128
            .checked_pow(decimals - scale)
            .and_then(|factor| self.mantissa().checked_mul(factor))
            .map(|units| units.to_string())
            .ok_or(MoneyAmountParseError::OutOfRange)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

/// Currencies a price may be denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => f.write_str("USD"),
        }
    }
}

/// A parsed price expression such as `"$0.001"`, `"0.10"` or `"2.50 USD"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSpec {
    currency: Currency,
    amount: MoneyAmount,
    raw: String,
}

impl PriceSpec {
    pub fn parse(raw: &str) -> Result<Self, MoneyAmountParseError> {
        let trimmed = raw.trim();
        let (currency, number) = split_currency(trimmed)?;
        let amount = MoneyAmount::parse(number)?;
        Ok(Self {
            currency,
            amount,
            raw: raw.to_string(),
        })
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn amount(&self) -> &MoneyAmount {
        &self.amount
    }

    /// The expression as the route author wrote it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Normalized numeric part, stable across spellings of the same price.
    pub fn nominal(&self) -> String {
        self.amount.to_string()
    }
}

impl FromStr for PriceSpec {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PriceSpec::parse(s)
    }
}

/// Splits the currency markers from the number. A bare number is USD.
///
/// A leading `$` and a trailing code may both be present, as in `$1 USD`.
fn split_currency(input: &str) -> Result<(Currency, &str), MoneyAmountParseError> {
    let (dollar, input) = match input.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    if let Some((number, code)) = input.rsplit_once(char::is_whitespace)
        && code.chars().all(|c| c.is_ascii_alphabetic())
    {
        return match code.to_ascii_uppercase().as_str() {
            "USD" | "USDC" => Ok((Currency::Usd, number.trim_end())),
            _ => Err(MoneyAmountParseError::UnsupportedCurrency(code.to_string())),
        };
    }
    if dollar {
        return Ok((Currency::Usd, input));
    }
    match input.chars().next() {
        Some(c) if c.is_ascii_digit() || c == '.' || c == '-' => Ok((Currency::Usd, input)),
        Some(c) => Err(MoneyAmountParseError::UnsupportedCurrency(c.to_string())),
        None => Err(MoneyAmountParseError::InvalidFormat),
    }
}

/// What a price resolves to on a particular rail.
///
/// `amount` is in the asset's smallest unit. `extra` carries scheme metadata
/// into [`crate::proto::PaymentRequirements::extra`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub asset: String,
    pub amount: String,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dollar_prefix() {
        let price = PriceSpec::parse("$0.001").unwrap();
        assert_eq!(price.currency(), Currency::Usd);
        assert_eq!(price.nominal(), "0.001");
        assert_eq!(price.raw(), "$0.001");
    }

    #[test]
    fn test_parse_bare_and_coded() {
        assert_eq!(PriceSpec::parse("0.10").unwrap().nominal(), "0.1");
        assert_eq!(PriceSpec::parse("2.50 USD").unwrap().nominal(), "2.5");
        assert_eq!(PriceSpec::parse(" 1,000.5 usdc ").unwrap().nominal(), "1000.5");
    }

    #[test]
    fn test_parse_dollar_and_code() {
        let price = PriceSpec::parse("$1 USD").unwrap();
        assert_eq!(price.currency(), Currency::Usd);
        assert_eq!(price.nominal(), "1");
        assert_eq!(PriceSpec::parse("$0.25 usdc").unwrap().nominal(), "0.25");
        assert_eq!(
            PriceSpec::parse("$1 EUR"),
            Err(MoneyAmountParseError::UnsupportedCurrency("EUR".into()))
        );
    }

    #[test]
    fn test_same_price_same_nominal() {
        let a = PriceSpec::parse("$0.0010").unwrap();
        let b = PriceSpec::parse("0.001").unwrap();
        assert_eq!(a.nominal(), b.nominal());
    }

    #[test]
    fn test_unsupported_currency() {
        assert_eq!(
            PriceSpec::parse("€20"),
            Err(MoneyAmountParseError::UnsupportedCurrency("€".into()))
        );
        assert_eq!(
            PriceSpec::parse("20 EUR"),
            Err(MoneyAmountParseError::UnsupportedCurrency("EUR".into()))
        );
    }

    #[test]
    fn test_malformed_numbers() {
        assert_eq!(PriceSpec::parse("$abc"), Err(MoneyAmountParseError::InvalidFormat));
        assert_eq!(PriceSpec::parse(""), Err(MoneyAmountParseError::InvalidFormat));
        assert_eq!(PriceSpec::parse("$"), Err(MoneyAmountParseError::InvalidFormat));
        assert_eq!(PriceSpec::parse("-1"), Err(MoneyAmountParseError::Negative));
        assert_eq!(PriceSpec::parse("$0"), Err(MoneyAmountParseError::OutOfRange));
        assert_eq!(
            PriceSpec::parse("$1000000000"),
            Err(MoneyAmountParseError::OutOfRange)
        );
    }

    #[test]
    fn test_to_token_units() {
        let amount = MoneyAmount::parse("0.001").unwrap();
        assert_eq!(amount.to_token_units(6).unwrap(), "1000");
        let amount = MoneyAmount::parse("12.34").unwrap();
        assert_eq!(amount.to_token_units(6).unwrap(), "12340000");
        let amount = MoneyAmount::parse("0.0000001").unwrap();
        assert_eq!(
            amount.to_token_units(6),
            Err(MoneyAmountParseError::WrongPrecision { money: 7, token: 6 })
        );
    }
}
