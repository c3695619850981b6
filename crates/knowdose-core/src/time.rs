use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

/// Storage representation: UTC with fixed millisecond precision, so string
/// order and chronological order agree.
const STORED_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

const DATE_ONLY: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// A UTC instant as stored on medications and dose records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self(datetime.to_offset(UtcOffset::UTC))
    }

    pub fn inner(&self) -> &OffsetDateTime {
        &self.0
    }

    pub fn unix_millis(&self) -> i128 {
        self.0.unix_timestamp_nanos() / 1_000_000
    }

    /// Formats the instant in the stored representation.
    pub fn to_stored(&self) -> Result<String> {
        Ok(self.0.format(STORED_FORMAT)?)
    }

    /// Interprets a client-supplied date value.
    ///
    /// Accepts RFC 3339 strings, plain `YYYY-MM-DD` dates (midnight UTC) and
    /// epoch milliseconds.
    pub fn from_client_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => s.parse(),
            Value::Number(n) => {
                let millis = n
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| {
                        n.as_f64()
                            .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                            .map(|f| i128::from(f.trunc() as i64))
                    })
                    .ok_or_else(|| CoreError::invalid_timestamp(n.to_string()))?;
                from_unix_millis(millis)
            }
            other => Err(CoreError::invalid_timestamp(other.to_string())),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self.0.format(STORED_FORMAT).map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for Timestamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(datetime) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            return Ok(Self::new(datetime));
        }
        let date = Date::parse(trimmed, DATE_ONLY)
            .map_err(|e| CoreError::invalid_timestamp(format!("'{s}': {e}")))?;
        Ok(Self::new(date.midnight().assume_utc()))
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self.0.format(STORED_FORMAT).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timestamp::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub fn now_utc() -> Timestamp {
    Timestamp::new(OffsetDateTime::now_utc())
}

pub fn from_unix_millis(millis: i128) -> Result<Timestamp> {
    let nanos = millis
        .checked_mul(1_000_000)
        .ok_or_else(|| CoreError::invalid_timestamp(format!("epoch millis {millis} out of range")))?;
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|e| {
        CoreError::invalid_timestamp(format!("epoch millis {millis} out of range: {e}"))
    })?;
    Ok(Timestamp::new(datetime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn test_stored_format_has_fixed_millis() {
        let ts = Timestamp::new(datetime!(2023-05-15 14:30:00 UTC));
        assert_eq!(ts.to_string(), "2023-05-15T14:30:00.000Z");

        let ts = Timestamp::new(datetime!(2023-05-15 14:30:00.5 UTC));
        assert_eq!(ts.to_string(), "2023-05-15T14:30:00.500Z");
    }

    #[test]
    fn test_stored_strings_sort_chronologically() {
        let earlier = Timestamp::new(datetime!(2023-05-15 14:30:00 UTC)).to_string();
        let later = Timestamp::new(datetime!(2023-05-15 14:30:00.25 UTC)).to_string();
        assert!(earlier < later);
    }

    #[test]
    fn test_parse_rfc3339_with_offset_normalizes_to_utc() {
        let ts: Timestamp = "2023-05-15T14:30:00+02:00".parse().unwrap();
        assert_eq!(ts.inner(), &datetime!(2023-05-15 12:30:00 UTC));
        assert_eq!(ts.to_string(), "2023-05-15T12:30:00.000Z");
    }

    #[test]
    fn test_parse_date_only_is_midnight_utc() {
        let ts: Timestamp = "2024-02-29".parse().unwrap();
        assert_eq!(ts.inner(), &datetime!(2024-02-29 00:00:00 UTC));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("invalid-date".parse::<Timestamp>().is_err());
        assert!("2023-13-01T00:00:00Z".parse::<Timestamp>().is_err());
        assert!("".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_from_client_value_epoch_millis() {
        let ts = Timestamp::from_client_value(&json!(1_700_000_000_123_i64)).unwrap();
        assert_eq!(ts.unix_millis(), 1_700_000_000_123);
        assert_eq!(ts.to_string(), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_from_client_value_rejects_other_shapes() {
        assert!(Timestamp::from_client_value(&json!(true)).is_err());
        assert!(Timestamp::from_client_value(&json!({"seconds": 1})).is_err());
    }

    #[test]
    fn test_from_client_value_rejects_out_of_range_epochs() {
        for value in [json!(1e300), json!(-1e300), json!(i64::MAX), json!(9.0e18)] {
            assert!(Timestamp::from_client_value(&value).is_err(), "{value}");
        }
        assert!(from_unix_millis(i128::MAX).is_err());
        assert!(from_unix_millis(i128::MIN).is_err());
    }

    #[test]
    fn test_serde_uses_stored_format() {
        let ts = Timestamp::new(datetime!(2023-05-15 14:30:00 UTC));
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2023-05-15T14:30:00.000Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_now_utc() {
        let now1 = now_utc();
        let now2 = now_utc();
        assert!(now2 >= now1);
    }
}
