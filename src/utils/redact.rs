use serde_json::{Map, Value as JsonValue};

const REDACTED: &str = "[REDACTED]";

/// Free-text fields that may carry personal details (task titles, event names, notes).
const PERSONAL_FIELDS: [&str; 7] = [
    "title",
    "name",
    "notes",
    "note",
    "description",
    "content",
    "participants",
];

/// Credentials are masked whatever their type.
const SECRET_FIELDS: [&str; 5] = ["apikey", "api_key", "authorization", "token", "password"];

/// Copy of `data` that is safe to log: personal text and credentials are masked, structure and
/// numbers are kept.
pub fn redact_sensitive_data(data: &JsonValue) -> JsonValue {
    match data {
        JsonValue::Object(map) => {
            let mut redacted = Map::with_capacity(map.len());
            for (key, value) in map {
                let lower = key.to_ascii_lowercase();
                let masked = if SECRET_FIELDS.contains(&lower.as_str()) {
                    JsonValue::String(REDACTED.to_string())
                } else if PERSONAL_FIELDS.contains(&lower.as_str()) {
                    mask_text(value)
                } else {
                    redact_sensitive_data(value)
                };
                redacted.insert(key.clone(), masked);
            }
            JsonValue::Object(redacted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(redact_sensitive_data).collect()),
        other => other.clone(),
    }
}

fn mask_text(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(text) if !text.is_empty() => JsonValue::String(REDACTED.to_string()),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(mask_text).collect()),
        other => other.clone(),
    }
}
