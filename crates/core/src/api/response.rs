use serde_json::Value;

/// Decode a response body: empty text is null, JSON is parsed, anything else
/// is kept verbatim as a string.
pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Human readable message for a failed response.
///
/// Looks at `message`, then `error`, then the raw text, and finally falls
/// back to `HTTP <status>`.
pub(crate) fn error_message(data: &Value, text: &str, status: u16) -> String {
    data.get("message")
        .and_then(message_text)
        .or_else(|| data.get("error").and_then(message_text))
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        // validation pipes on the backend report one entry per field
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(Value::as_str)
                .filter(|item| !item.trim().is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}
