//! Entity keys and parameter canonicalization
//!
//! An entity key is the unit of mutual exclusion and history: two runs share
//! a key only if entity name, canonical parameters and schema version all
//! match. Parameters are canonicalized once, so `{"b":2,"a":1}` and
//! `{"a":1,"b":2}` always land on the same key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered parameter map attached to an entity.
pub type Parameters = BTreeMap<String, Value>;

/// Serialize parameters to their canonical JSON form.
///
/// Keys are emitted in sorted order at every nesting level. Absent or empty
/// maps have no canonical form and yield `None`.
pub fn canonicalize_parameters(parameters: Option<&Parameters>) -> Option<String> {
    let parameters = parameters.filter(|p| !p.is_empty())?;
    let sorted: BTreeMap<&str, Value> =
        parameters.iter().map(|(k, v)| (k.as_str(), sort_value(v))).collect();
    serde_json::to_string(&sorted).ok()
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), sort_value(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// (entity name, canonical parameters, schema version)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity: String,
    pub parameters_json: Option<String>,
    pub schema_version: Option<i32>,
}

impl EntityKey {
    pub fn new(
        entity: impl Into<String>,
        parameters_json: Option<String>,
        schema_version: Option<i32>,
    ) -> Self {
        Self { entity: entity.into(), parameters_json, schema_version }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity)?;
        if let Some(params) = &self.parameters_json {
            write!(f, " {params}")?;
        }
        if let Some(version) = self.schema_version {
            write!(f, " v{version}")?;
        }
        Ok(())
    }
}
