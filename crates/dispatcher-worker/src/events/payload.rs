//! Payload extraction, ported verbatim from
//! `original_source/processgpt_agent_sdk/processgpt_agent_framework.py`'s
//! `_parse_json_or_text` / `_extract_payload`. `serde_json::Value`
//! already distinguishes Null/String/Object/Array/Number/Bool, which
//! covers most of the shapes an executor event's payload can arrive in;
//! `Bytes` is kept as an explicit variant for sources that hand over raw
//! bytes (decoded lossily as UTF-8 and then treated like a string).

use serde_json::{Map, Value};

/// The raw shape an executor event's `artifact` or `status.message` field
/// can arrive in, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Str(String),
    Bytes(Vec<u8>),
    Value(Value),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Null,
            Value::String(s) => Payload::Str(s),
            other => Payload::Value(other),
        }
    }
}

/// Picks `artifact` if present, else `status.message`, then normalizes:
/// trim and try a JSON parse, falling back to the trimmed string; for
/// objects, prefer `parts[0].{text,content,data}` over the object's own
/// top-level `text`/`content`/`data`, else return the object unchanged.
pub fn extract_payload(artifact: Option<Payload>, status_message: Option<Payload>) -> Value {
    match artifact.or(status_message) {
        None | Some(Payload::Null) => Value::Object(Map::new()),
        Some(Payload::Str(s)) => normalize_string(&s),
        Some(Payload::Bytes(b)) => normalize_string(&String::from_utf8_lossy(&b)),
        Some(Payload::Value(v)) => normalize(v),
    }
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Null => Value::Object(Map::new()),
        Value::String(s) => normalize_string(&s),
        Value::Object(map) => normalize_object(map),
        other => other,
    }
}

/// Step 2: trim; empty string short-circuits; otherwise attempt a JSON
/// parse, falling back to the trimmed string itself on failure.
fn normalize_string(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Steps 3-6: `parts[0].{text,content,data}` takes precedence over the
/// dict's own top-level `text`/`content`/`data`; otherwise the dict is
/// returned unchanged. Matches Python's falsy-`or` chain: an empty string
/// is skipped just like `None` would be.
fn normalize_object(map: Map<String, Value>) -> Value {
    if let Some(Value::Array(parts)) = map.get("parts") {
        if let Some(Value::Object(first)) = parts.first() {
            if let Some(text) = first_non_empty_string(first, &["text", "content", "data"]) {
                return normalize_string(&text);
            }
        }
    }

    if let Some(text) = first_non_empty_string(&map, &["text", "content", "data"]) {
        return normalize_string(&text);
    }

    Value::Object(map)
}

fn first_non_empty_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}
