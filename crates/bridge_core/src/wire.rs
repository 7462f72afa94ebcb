//! Lenient (de)serialization helpers for OCPI payloads.
//!
//! Upstream CPOs are inconsistent about numbers: coordinates arrive as strings,
//! ids sometimes as integers, prices as floats or strings. These helpers accept
//! every shape we have seen and fall back to a neutral default otherwise.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Accept a string or a number and keep its textual form. `null` becomes "".
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected a string or a number, got {other}"
        ))),
    }
}

pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Ok(None),
    }
}

/// Treat an explicit `null` the same as a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a decimal from a JSON number or numeric string.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}

/// Decimal that defaults to zero on a missing or unparsable value.
pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_decimal(&value).unwrap_or(Decimal::ZERO))
}

pub fn opt_lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_decimal(&value))
}

/// Unsigned integer from a number (floats are truncated) or numeric string.
pub fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(parsed.unwrap_or(0))
}

/// Emit a decimal as a JSON number, the way OCPI peers expect it.
pub fn decimal_as_number<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.to_f64().unwrap_or_default())
}

pub fn opt_decimal_as_number<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.map(|d| d.to_f64().unwrap_or_default()).serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "string_or_number")]
        id: String,
        #[serde(default, deserialize_with = "lenient_decimal")]
        price: Decimal,
        #[serde(default, deserialize_with = "lenient_u64")]
        power: u64,
        #[serde(default, deserialize_with = "null_as_default")]
        tags: Vec<String>,
    }

    #[test]
    fn test_numbers_and_strings_are_both_accepted() {
        let sample: Sample =
            serde_json::from_value(json!({"id": 7, "price": "8.50", "power": 22000.0, "tags": null}))
                .unwrap();
        assert_eq!(sample.id, "7");
        assert_eq!(sample.price, Decimal::new(850, 2));
        assert_eq!(sample.power, 22000);
        assert!(sample.tags.is_empty());
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let sample: Sample =
            serde_json::from_value(json!({"price": "free", "power": "lots"})).unwrap();
        assert_eq!(sample.id, "");
        assert_eq!(sample.price, Decimal::ZERO);
        assert_eq!(sample.power, 0);
    }

    #[test]
    fn test_scientific_notation_is_parsed() {
        assert_eq!(parse_decimal(&json!("1e2")), Some(Decimal::from(100)));
    }
}
