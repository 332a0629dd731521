//! Numeric coercion for cents fields.
//!
//! Pricing fields arrive as JSON numbers, numeric strings, or garbage depending
//! on which writer produced them. Everything funnels through [`coerce_cents`]:
//! a missing or invalid value is *absent*, never zero.

use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Coerce a JSON value into a non-negative integer amount of cents.
///
/// Accepts integers, floats and decimal strings (`"14964"`, `"14964.00"`).
/// Fractional values are rounded half away from zero. Negative numbers,
/// empty strings, booleans, null, arrays and objects yield `None`.
#[must_use]
pub fn coerce_cents(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return (i >= 0).then_some(i);
            }
            if n.is_u64() {
                // Larger than i64::MAX.
                return None;
            }
            n.as_f64().and_then(Decimal::from_f64).and_then(round_cents)
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            Decimal::from_str(trimmed).ok().and_then(round_cents)
        }
        _ => None,
    }
}

/// Coerce `map[key]`.
#[must_use]
pub fn cents_field(map: &Map<String, Value>, key: &str) -> Option<i64> {
    map.get(key).and_then(coerce_cents)
}

/// Whether `map[key]` is already stored as a plain JSON integer.
#[must_use]
pub fn is_integer_field(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).is_some_and(|v| v.as_i64().is_some())
}

fn round_cents(amount: Decimal) -> Option<i64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Serde adapter for required cents fields that may arrive as strings.
///
/// # Errors
///
/// Fails when the value cannot be coerced into non-negative cents.
pub fn deserialize_cents<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    coerce_cents(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("expected non-negative cents, got {value}"))
    })
}

/// Serde adapter for optional cents fields; invalid values become `None`.
///
/// # Errors
///
/// Only fails when the input is not valid JSON.
pub fn deserialize_optional_cents<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_cents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integers_pass_through() {
        assert_eq!(coerce_cents(&json!(14964)), Some(14964));
        assert_eq!(coerce_cents(&json!(0)), Some(0));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        assert_eq!(coerce_cents(&json!("14964")), Some(14964));
        assert_eq!(coerce_cents(&json!(" 2000 ")), Some(2000));
        assert_eq!(coerce_cents(&json!("3671.00")), Some(3671));
    }

    #[test]
    fn test_fractions_round_half_away_from_zero() {
        assert_eq!(coerce_cents(&json!(10.5)), Some(11));
        assert_eq!(coerce_cents(&json!("10.49")), Some(10));
    }

    #[test]
    fn test_invalid_values_are_absent_not_zero() {
        assert_eq!(coerce_cents(&json!(-5)), None);
        assert_eq!(coerce_cents(&json!("-5")), None);
        assert_eq!(coerce_cents(&json!("")), None);
        assert_eq!(coerce_cents(&json!("abc")), None);
        assert_eq!(coerce_cents(&json!(null)), None);
        assert_eq!(coerce_cents(&json!(true)), None);
        assert_eq!(coerce_cents(&json!({"cents": 1})), None);
    }

    #[test]
    fn test_deserialize_cents_accepts_strings() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "deserialize_cents")]
            amount: i64,
            #[serde(default, deserialize_with = "deserialize_optional_cents")]
            extra: Option<i64>,
        }

        let probe: Probe = serde_json::from_value(json!({"amount": "15338"})).expect("valid");
        assert_eq!(probe.amount, 15338);
        assert_eq!(probe.extra, None);

        let bad = serde_json::from_value::<Probe>(json!({"amount": "n/a"}));
        assert!(bad.is_err());
    }
}
