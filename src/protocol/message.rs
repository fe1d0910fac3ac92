use serde_json::Value;

/// Keys checked, in order, when unwrapping an error-shaped payload
const MESSAGE_KEYS: [&str; 3] = ["data", "error", "text"];

/// Turn an arbitrary error-shaped payload into display text.
///
/// Strings are returned as-is. Objects are unwrapped through the first of
/// `data`, `error` or `text` they contain; an object with none of those is
/// rendered as compact JSON, as is any other non-string value.
pub fn extract_message(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => MESSAGE_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .map(extract_message)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
