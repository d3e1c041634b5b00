//! Conversion of caller-facing major-unit amounts into the provider's minor unit.

use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use serde_json::Value;
use thiserror::Error;

const MINOR_UNITS_PER_MAJOR: i64 = 100;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount must be a number or numeric string")]
    NotNumeric,
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount has more precision than the currency's minor unit")]
    TooPrecise,
    #[error("amount is too large")]
    Overflow,
}

/// Parses a JSON amount (number or numeric string) without a float round-trip.
pub fn parse_amount(value: &Value) -> Result<BigDecimal, AmountError> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(AmountError::NotNumeric),
    };
    BigDecimal::from_str(&raw).map_err(|_| AmountError::NotNumeric)
}

/// Converts a major-unit amount (e.g. rupees) into integer minor units (paise).
pub fn to_minor_units(amount: &BigDecimal) -> Result<i64, AmountError> {
    if *amount <= BigDecimal::from(0) {
        return Err(AmountError::NotPositive);
    }

    let scaled = amount.clone() * BigDecimal::from(MINOR_UNITS_PER_MAJOR);
    if scaled.with_scale(0) != scaled {
        return Err(AmountError::TooPrecise);
    }

    scaled.to_i64().ok_or(AmountError::Overflow)
}
