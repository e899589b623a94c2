//! Path-based accessor over a decoded resource payload, replacing ad-hoc
//! casts on `serde_json::Value` with a single traversal function extractors
//! share.

use serde_json::Value;

/// Walk `path` through nested JSON objects, returning the value at the end
/// if every segment resolves to an object key. Returns `None` as soon as a
/// segment is missing or an intermediate value isn't an object — arrays are
/// not indexed by this helper, matching the extractor fields it serves
/// (`spec.selector`, `secretStoreRef.name`, ...), all of which are object
/// paths.
pub fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// `get_path` plus a string coercion.
pub fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    get_path(value, path)?.as_str()
}

/// `get_path` plus an object coercion, for reading label/annotation maps.
pub fn get_object<'a>(value: &'a Value, path: &[&str]) -> Option<&'a serde_json::Map<String, Value>> {
    get_path(value, path)?.as_object()
}

/// `get_path` plus an array coercion, for reading lists like
/// `ownerReferences`.
pub fn get_array<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Vec<Value>> {
    get_path(value, path)?.as_array()
}

/// Read a flat `map<string,string>` at `path` (e.g. `metadata.labels`),
/// skipping any non-string values rather than failing the whole lookup.
pub fn get_string_map(value: &Value, path: &[&str]) -> std::collections::BTreeMap<String, String> {
    let mut out = std::collections::BTreeMap::new();
    if let Some(obj) = get_object(value, path) {
        for (k, v) in obj {
            if let Some(s) = v.as_str() {
                out.insert(k.clone(), s.to_string());
            }
        }
    }
    out
}
