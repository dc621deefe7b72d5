//! The single custom decimal codec: decimals are strings on the wire, and
//! must round-trip without the precision loss a `f64` would introduce.
//!
//! DTOs throughout `models.rs` use [`Price`]/[`Quantity`] (thin aliases over
//! [`rust_decimal::Decimal`]) with `#[serde(with = "decimal_str")]` rather
//! than raw `f64` fields, so every price/quantity on the wire is decoded
//! exactly once, in one place.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A price, stored as an exact decimal.
pub type Price = Decimal;

/// A quantity, stored as an exact decimal.
pub type Quantity = Decimal;

/// `serde(with = "decimal_str")` encodes/decodes a [`Decimal`] as a JSON
/// string, the wire format every endpoint uses for numeric fields.
pub mod decimal_str {
    use super::*;

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.normalize().to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Decimal>().map_err(serde::de::Error::custom)
    }
}

/// As [`decimal_str`], but for an `Option<Decimal>` field that may be absent
/// or `null` on the wire.
pub mod opt_decimal_str {
    use super::*;

    pub fn serialize<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(&d.normalize().to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) if !s.is_empty() => {
                s.parse::<Decimal>().map(Some).map_err(serde::de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Wire {
        #[serde(with = "decimal_str")]
        price: Decimal,
    }

    #[test]
    fn round_trips_exact_decimal() {
        let original = Wire {
            price: "0.1000000001".parse().unwrap(),
        };
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, r#"{"price":"0.1000000001"}"#);
        let back: Wire = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn f64_would_have_lost_precision_but_decimal_does_not() {
        let d: Decimal = "184467440737.09551616".parse().unwrap();
        assert_eq!(d.to_string(), "184467440737.09551616");
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct OptWire {
        #[serde(with = "opt_decimal_str")]
        price: Option<Decimal>,
    }

    #[test]
    fn optional_decimal_handles_null() {
        let w: OptWire = serde_json::from_str(r#"{"price":null}"#).unwrap();
        assert_eq!(w.price, None);
    }

    #[test]
    fn optional_decimal_handles_value() {
        let w: OptWire = serde_json::from_str(r#"{"price":"1.5"}"#).unwrap();
        assert_eq!(w.price, Some("1.5".parse().unwrap()));
    }
}
