//! Normalized identifiers.
//!
//! Identifiers arrive as strings or integers depending on which producer
//! emitted the event. Both [`ConversationId`] and [`UserId`] store the trimmed
//! string form, so `42`, `"42"` and `" 42 "` compare equal.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

/// Field names that may carry a conversation identifier, in priority order.
const CONVERSATION_ID_FIELDS: [&str; 3] = ["conversationId", "conversation_id", "id"];

/// Fields that name a conversation even when the payload describes something
/// else, such as a message with its own `id`.
const EXPLICIT_CONVERSATION_ID_FIELDS: [&str; 2] = ["conversationId", "conversation_id"];

/// Stable, server-issued conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Normalize a raw identifier. `None` if it is blank.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        normalize_str(raw.as_ref()).map(Self)
    }

    /// Normalize a JSON string or integer. `None` for any other shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        normalize_value(value).map(Self)
    }

    /// Extract the identifier from an event payload.
    ///
    /// Accepts a bare string/integer payload or an object carrying the
    /// identifier under any of the known field names. The first field that
    /// holds a usable value wins.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        if let Some(id) = Self::from_value(payload) {
            return Some(id);
        }
        CONVERSATION_ID_FIELDS
            .iter()
            .filter_map(|field| payload.get(field))
            .find_map(Self::from_value)
    }

    /// Extract the identifier only from explicitly named conversation fields.
    ///
    /// For payloads whose bare `id` belongs to another entity.
    pub fn from_explicit_fields(payload: &Value) -> Option<Self> {
        EXPLICIT_CONVERSATION_ID_FIELDS
            .iter()
            .filter_map(|field| payload.get(field))
            .find_map(Self::from_value)
    }

    /// Normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| de::Error::custom("expected a non-empty string or integer identifier"))
    }
}

/// User identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Normalize a raw identifier. `None` if it is blank.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        normalize_str(raw.as_ref()).map(Self)
    }

    /// Normalize a JSON string or integer. `None` for any other shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        normalize_value(value).map(Self)
    }

    /// Normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| de::Error::custom("expected a non-empty string or integer identifier"))
    }
}

/// Normalize any JSON scalar that can act as an identifier.
pub(crate) fn normalize_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_str(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_str(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_owned()) }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numeric_and_string_ids_compare_equal() {
        let from_number = ConversationId::from_value(&json!(42));
        let from_string = ConversationId::from_value(&json!(" 42 "));
        assert_eq!(from_number, from_string);
        assert_eq!(from_number.map(|id| id.to_string()), Some("42".to_owned()));
    }

    #[test]
    fn payload_field_priority() {
        let payload = json!({ "id": "fallback", "conversation_id": "snake" });
        assert_eq!(ConversationId::from_payload(&payload), ConversationId::new("snake"));

        let payload = json!({ "id": 7, "conversationId": "camel" });
        assert_eq!(ConversationId::from_payload(&payload), ConversationId::new("camel"));
    }

    #[test]
    fn blank_field_falls_through_to_next() {
        let payload = json!({ "conversationId": "  ", "id": 9 });
        assert_eq!(ConversationId::from_payload(&payload), ConversationId::new("9"));
    }

    #[test]
    fn bare_payload_is_an_identifier() {
        assert_eq!(ConversationId::from_payload(&json!("c-1")), ConversationId::new("c-1"));
        assert_eq!(ConversationId::from_payload(&json!({})), None);
        assert_eq!(ConversationId::from_payload(&json!(null)), None);
    }

    #[test]
    fn deserialize_rejects_blank() {
        assert!(serde_json::from_value::<UserId>(json!("")).is_err());
        assert!(serde_json::from_value::<UserId>(json!(true)).is_err());
        assert_eq!(serde_json::from_value::<UserId>(json!(5)).ok(), UserId::new("5"));
    }
}
