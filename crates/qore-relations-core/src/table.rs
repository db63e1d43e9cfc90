// SPDX-License-Identifier: Apache-2.0

//! Table identifier
//!
//! Tables are named differently by each data source kind: Postgres uses
//! `{"schema": "public", "name": "users"}`, some connectors use a bare
//! string, others an array of path segments. The identifier keeps the
//! server's JSON as-is and compares it structurally.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Schema assumed for bare table names on Postgres-like sources
pub const DEFAULT_SCHEMA: &str = "public";

/// Opaque handle naming a table within a data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table(Value);

impl Table {
    /// Wraps a raw identifier as sent by the server.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self(json!({ "schema": schema.into(), "name": name.into() }))
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self(Value::String(name.into()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the `(schema, name)` pair for Postgres-style identifiers.
    pub fn schema_and_name(&self) -> Option<(String, String)> {
        match &self.0 {
            Value::String(name) => Some((DEFAULT_SCHEMA.to_string(), name.clone())),
            Value::Object(map) => {
                let name = map.get("name")?.as_str()?;
                let schema = match map.get("schema") {
                    Some(value) => value.as_str()?,
                    None => DEFAULT_SCHEMA,
                };
                Some((schema.to_string(), name.to_string()))
            }
            _ => None,
        }
    }

    /// Whether both identifiers name the same table.
    ///
    /// Postgres-style identifiers compare by `(schema, name)`, so a bare
    /// `"users"` equals `{"schema": "public", "name": "users"}`. Anything
    /// else falls back to structural equality.
    pub fn same_table(&self, other: &Table) -> bool {
        if self == other {
            return true;
        }
        match (self.schema_and_name(), other.schema_and_name()) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    /// Deterministic string form used in cache keys.
    ///
    /// Object keys are emitted in sorted order, so two structurally equal
    /// identifiers always produce the same fragment.
    pub fn cache_fragment(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((schema, name)) = self.schema_and_name() {
            return write!(f, "{}.{}", schema, name);
        }
        match &self.0 {
            Value::Array(parts) => {
                let parts: Vec<String> = parts
                    .iter()
                    .map(|part| match part {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join("."))
            }
            other => write!(f, "{}", other),
        }
    }
}
