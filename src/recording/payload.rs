//! Recording payload lookup
//!
//! Workers place the base64 payload under different field names. Known
//! locations are tried in order; if none holds a non-empty string, a
//! depth-limited scan picks the first string that is long enough to be audio.

use serde_json::Value;

/// Smallest string the generic scan accepts as a payload
pub const SCAN_MIN_LEN: usize = 64;

/// Nesting levels the generic scan descends into
pub const SCAN_MAX_DEPTH: usize = 4;

type Accessor = fn(&Value) -> Option<&str>;

const ACCESSORS: &[Accessor] = &[
    |v| v.get("fullRecord")?.as_str(),
    |v| v.get("chunk")?.as_str(),
    |v| v.get("b64_buffer")?.as_str(),
    |v| v.get("payload")?.as_str(),
    |v| v.get("buffer")?.as_str(),
    |v| v.get("audio")?.as_str(),
    |v| v.get("data")?.as_str(),
    |v| v.pointer("/data/fullRecord")?.as_str(),
    |v| v.pointer("/data/chunk")?.as_str(),
    |v| v.pointer("/data/payload")?.as_str(),
];

/// Base64 payload carried by a recording frame, if any
pub fn resolve(frame: &Value) -> Option<&str> {
    ACCESSORS
        .iter()
        .filter_map(|accessor| accessor(frame))
        .find(|s| !s.is_empty())
        .or_else(|| scan(frame, 0))
}

fn scan(value: &Value, depth: usize) -> Option<&str> {
    if depth > SCAN_MAX_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| key.as_str() != "type")
            .find_map(|(_, v)| match v {
                Value::String(s) if s.len() >= SCAN_MIN_LEN => Some(s.as_str()),
                Value::Object(_) | Value::Array(_) => scan(v, depth + 1),
                _ => None,
            }),
        Value::Array(items) => items.iter().find_map(|v| match v {
            Value::String(s) if s.len() >= SCAN_MIN_LEN => Some(s.as_str()),
            Value::Object(_) | Value::Array(_) => scan(v, depth + 1),
            _ => None,
        }),
        _ => None,
    }
}
