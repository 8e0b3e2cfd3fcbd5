//! Safe accessors over loosely-typed Kubernetes objects.
//!
//! Objects coming from the dynamic client are plain `serde_json::Value`
//! trees. Required fields go through the `required_*` helpers, which return a
//! [`FieldError`]; everything else degrades to `None` when absent, null or of
//! an unexpected type.

use std::collections::BTreeMap;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("missing field `{0}`")]
    Missing(String),
    #[error("field `{path}` is not a {expected}")]
    WrongType { path: String, expected: &'static str },
}

/// Walk `path` (object keys) from `root`. JSON null counts as absent.
pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path {
        cur = cur.as_object()?.get(*seg)?;
    }
    if cur.is_null() { None } else { Some(cur) }
}

pub fn optional_str<'a>(root: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(root, path).and_then(Value::as_str)
}

pub fn optional_bool(root: &Value, path: &[&str]) -> Option<bool> {
    lookup(root, path).and_then(Value::as_bool)
}

pub fn required_str<'a>(root: &'a Value, path: &[&str]) -> Result<&'a str, FieldError> {
    let v = lookup(root, path).ok_or_else(|| FieldError::Missing(path.join(".")))?;
    v.as_str().ok_or_else(|| FieldError::WrongType { path: path.join("."), expected: "string" })
}

/// Read a `map[string]string` (labels, annotations). Non-string values are skipped.
pub fn string_map(root: &Value, path: &[&str]) -> BTreeMap<String, String> {
    let Some(obj) = lookup(root, path).and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    obj.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}
