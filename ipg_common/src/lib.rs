//! Leaf types shared by the invoice payment gateway crates.
mod error_kind;
mod helpers;
mod minor_units;
mod secret;

pub use error_kind::ErrorKind;
pub use helpers::{parse_boolean_flag, parse_named_tokens};
pub use minor_units::{currency_exponent, AmountParseError, MinorUnits, DEFAULT_CURRENCY};
pub use secret::Secret;
