use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A scalar metadata value. Dataset items are opaque nested mappings of
/// these; once projected into a `Document`, metadata stays flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl MetadataValue {
    /// Stringify the value the way field-path projection does: `page_content`
    /// joins `"{path}: {value}"` over the string form of each projected field.
    pub fn stringify(&self) -> String {
        match self {
            MetadataValue::String(s) => s.clone(),
            MetadataValue::Int(i) => i.to_string(),
            MetadataValue::Float(f) => format_number(*f),
            MetadataValue::Bool(b) => b.to_string(),
            MetadataValue::Null => String::new(),
        }
    }

    pub fn is_empty_string(&self) -> bool {
        matches!(self, MetadataValue::String(s) if s.is_empty())
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Flat metadata map, keyed by output metadata key. A `BTreeMap` keeps keys
/// in lexicographic order for free, which is exactly the canonicalisation
/// rule `canonical_json` needs (see [`crate::canonical`]).
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// Render a float without trailing zeros, per the canonicalisation rule in
/// spec §9: "render numbers without trailing zeros".
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let rendered = format!("{value}");
        rendered
    }
}

/// Nested dataset-item mapping: string keys to either a scalar or a nested
/// mapping. Field-path projection (§4.1) walks this structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetItem(pub serde_json::Value);

impl DatasetItem {
    /// Resolve a dot-separated field path. A missing intermediate yields the
    /// empty string; the final value is coerced to string.
    pub fn get_nested(&self, path: &str) -> String {
        let mut current = &self.0;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(value) => current = value,
                None => return String::new(),
            }
        }
        scalar_to_string(current)
    }
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
