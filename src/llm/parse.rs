use serde_json::Value;

/// Best-effort extraction of a JSON array from model output.
///
/// Models wrap JSON in prose or code fences often enough that strict
/// parsing is not an option: try the whole string first, then the
/// bounded substring between the first `[` and the last `]`.
pub fn extract_json_array(raw: &str) -> Option<Value> {
    extract(raw, '[', ']').filter(Value::is_array)
}

/// Best-effort extraction of a JSON object from model output.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    extract(raw, '{', '}').filter(Value::is_object)
}

fn extract(raw: &str, open: char, close: char) -> Option<Value> {
    let trimmed = strip_fences(raw.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find(open)?;
    let end = trimmed.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn strip_fences(raw: &str) -> &str {
    let without_open = raw
        .strip_prefix("```json")
        .or_else(|| raw.strip_prefix("```"))
        .unwrap_or(raw);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
