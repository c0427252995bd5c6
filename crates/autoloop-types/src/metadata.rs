use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Typed sum-type value for decision/task metadata maps, per §9's
/// "dynamic typing" design note: a `HashMap<String, serde_json::Value>`
/// would accept anything at the type level, so instead every metadata
/// slot is one of these variants and validated at persistence boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<MetadataValue>),
    Map(HashMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
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

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

pub type Metadata = HashMap<String, MetadataValue>;
