//! Normalization of collapsed metadata before it is sent to the index.
//!
//! - fields whose value is an empty string are dropped
//! - fields on the disallow list are dropped
//! - a plain string or integer becomes a one-element list of strings
//! - anything else (lists, objects, floats, booleans) is left alone
//!
//! Cleaning already-cleaned metadata is a no-op.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

use crate::config::CleaningConfig;

/// Field names that are never sent to the index.
#[derive(Debug, Clone, Default)]
pub struct DisallowList(HashSet<String>);

impl DisallowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn from_config(config: &CleaningConfig) -> Self {
        Self::new(config.disallowed_fields.iter().cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }
}

/// Metadata ready to be applied to index records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CleanedMetadata(Map<String, Value>);

impl CleanedMetadata {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Serialized form stored on the contour file's record.
    pub fn to_json_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}

pub fn clean(fields: Map<String, Value>, disallow: &DisallowList) -> CleanedMetadata {
    let cleaned = fields
        .into_iter()
        .filter_map(|(name, value)| {
            if disallow.contains(&name) {
                debug!("Dropping disallowed field {}", name);
                return None;
            }
            normalize(value).map(|value| (name, value))
        })
        .collect();
    CleanedMetadata(cleaned)
}

fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(Value::Array(vec![Value::String(s)])),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            Some(Value::Array(vec![Value::String(n.to_string())]))
        }
        other => Some(other),
    }
}
