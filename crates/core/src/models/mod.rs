//! Shared domain models and the boundary coercions applied when reading them.

mod catalog;
mod contract;
mod user;

pub use catalog::{LinkFilter, NewProviderLink, NewService, ProviderServiceLink, Service};
pub use contract::{Contract, ContractStatus, NewContract, Rating};
pub use user::{NewUser, Session, User, UserRole};

/// Lenient deserializers for backend fields whose JSON type is not stable.
pub(crate) mod coerce {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer};
    use serde_json::Value;

    /// Identifier sent either as a number or a numeric string.
    pub fn id<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        id_from_value(&value).ok_or_else(|| de::Error::custom(format!("invalid id {value}")))
    }

    /// Positive amount sent either as a number or a numeric string.
    pub fn money<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        money_from_value(&value)?
            .ok_or_else(|| de::Error::custom(format!("missing amount in {value}")))
    }

    /// Optional amount; null and empty strings mean absent.
    pub fn optional_money<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        money_from_value(&value)
    }

    /// Optional calendar date from `YYYY-MM-DD` or a full timestamp.
    pub fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::String(raw) if raw.trim().is_empty() => Ok(None),
            Value::String(raw) => parse_date(raw.trim())
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid date '{raw}'"))),
            other => Err(de::Error::custom(format!("invalid date {other}"))),
        }
    }

    /// `id` of a write reply, whatever else the reply carries.
    pub(crate) fn record_id(body: &Value) -> Option<i64> {
        body.get("id").and_then(id_from_value)
    }

    pub(crate) fn id_from_value(value: &Value) -> Option<i64> {
        match value {
            Value::Number(number) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|float| float.fract() == 0.0)
                    .map(|float| float as i64)
            }),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        }
    }

    fn money_from_value<E: de::Error>(value: &Value) -> Result<Option<f64>, E> {
        match value {
            Value::Null => Ok(None),
            Value::Number(number) => Ok(number.as_f64()),
            Value::String(raw) if raw.trim().is_empty() => Ok(None),
            Value::String(raw) => raw
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .map(Some)
                .map_err(|_| E::custom(format!("invalid amount '{raw}'"))),
            other => Err(E::custom(format!("invalid amount {other}"))),
        }
    }

    fn parse_date(raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.date())
            })
    }
}
