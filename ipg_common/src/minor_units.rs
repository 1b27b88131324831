use std::{
    fmt::Display,
    iter::Sum,
    ops::Add,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invoices without an explicit currency are assumed to be in yen.
pub const DEFAULT_CURRENCY: &str = "JPY";

/// Currencies that PayPal (and ISO 4217) treat as having no minor unit.
const ZERO_DECIMAL_CURRENCIES: [&str; 8] = ["BIF", "CLP", "HUF", "ISK", "JPY", "KRW", "TWD", "VND"];

/// The number of decimal places used by the given ISO 4217 currency code.
pub fn currency_exponent(currency: &str) -> u32 {
    let code = currency.trim().to_ascii_uppercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&code.as_str()) {
        0
    } else {
        2
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("Amount is empty")]
    Empty,
    #[error("Amount is negative: {0}")]
    Negative(String),
    #[error("Amount has more decimal places than {currency} allows: {value}")]
    TooPrecise { value: String, currency: String },
    #[error("Amount is not a number: {0}")]
    NotANumber(String),
    #[error("Amount is too large: {0}")]
    Overflow(String),
}

//--------------------------------------     MinorUnits       ---------------------------------------------------------
/// A non-negative amount expressed in the minor units of its currency (cents for USD, yen for JPY).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinorUnits(u64);

impl From<u64> for MinorUnits {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Add for MinorUnits {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MinorUnits {
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Formats the amount as the decimal string PayPal expects, e.g. `1234` USD becomes `"12.34"` and `100000` JPY
    /// stays `"100000"`.
    pub fn to_decimal_string(&self, currency: &str) -> String {
        let exponent = currency_exponent(currency);
        if exponent == 0 {
            return self.0.to_string();
        }
        let scale = 10u64.pow(exponent);
        format!("{}.{:0width$}", self.0 / scale, self.0 % scale, width = exponent as usize)
    }

    /// Parses a plain decimal string (`"12.34"`, `"100000"`) in the given currency.
    pub fn from_decimal_str(value: &str, currency: &str) -> Result<Self, AmountParseError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AmountParseError::Empty);
        }
        if value.starts_with('-') {
            return Err(AmountParseError::Negative(value.to_string()));
        }
        let exponent = currency_exponent(currency);
        let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
            return Err(AmountParseError::NotANumber(value.to_string()));
        }
        // Trailing zeros beyond the currency precision carry no value ("100000.00" JPY)
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > exponent as usize {
            return Err(AmountParseError::TooPrecise { value: value.to_string(), currency: currency.to_string() });
        }
        let overflow = || AmountParseError::Overflow(value.to_string());
        let whole = if whole.is_empty() { 0 } else { whole.parse::<u64>().map_err(|_| overflow())? };
        let padded = format!("{fraction:0<width$}", width = exponent as usize);
        let fraction = if padded.is_empty() { 0 } else { padded.parse::<u64>().map_err(|_| overflow())? };
        whole
            .checked_mul(10u64.pow(exponent))
            .and_then(|v| v.checked_add(fraction))
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Parses the human-formatted amounts found in older history files and extracted invoices: `"¥100,000"`,
    /// `"100,000円"`, `"USD 1,234.50"`, or full-width digits. Grouping separators and currency marks are stripped.
    pub fn parse_formatted(value: &str, currency: &str) -> Result<Self, AmountParseError> {
        let normalised = value
            .chars()
            .map(|c| match c {
                '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
                '，' => ',',
                '．' => '.',
                '－' | '−' => '-',
                c => c,
            })
            .collect::<String>();
        let stripped = normalised
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
            .collect::<String>();
        let stripped = stripped.trim_matches(|c| c == '.' || c == ',').replace(',', "");
        if stripped.is_empty() {
            return Err(AmountParseError::Empty);
        }
        Self::from_decimal_str(&stripped, currency)
    }
}
