//! Lenient timestamp decoding.
//!
//! Producers send either RFC 3339 strings or Unix epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
}

/// Deserialize an optional timestamp. `null` and absent fields become `None`.
pub(crate) fn option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(text.trim())
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(de::Error::custom),
        Some(RawTimestamp::Millis(ms)) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {ms}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "option")]
        at: Option<DateTime<Utc>>,
    }

    fn probe(value: serde_json::Value) -> Option<Option<DateTime<Utc>>> {
        serde_json::from_value::<Probe>(value).ok().map(|p| p.at)
    }

    #[test]
    fn accepts_rfc3339_and_millis() {
        let text = probe(json!({ "at": "2024-05-01T12:00:00Z" })).flatten();
        let millis = probe(json!({ "at": 1_714_564_800_000_i64 })).flatten();
        assert!(text.is_some());
        assert_eq!(text, millis);
    }

    #[test]
    fn absent_and_null_are_none() {
        assert_eq!(probe(json!({})), Some(None));
        assert_eq!(probe(json!({ "at": null })), Some(None));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(probe(json!({ "at": "yesterday" })), None);
    }
}
