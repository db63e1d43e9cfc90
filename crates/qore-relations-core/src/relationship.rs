// SPDX-License-Identifier: Apache-2.0

//! Normalized relationship descriptors
//!
//! These are what the console renders: one flat list regardless of whether
//! a relationship was declared manually, backed by a foreign key, or points
//! to another source or remote schema.

use std::fmt;
use std::ops::Index;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::metadata::RemoteField;
use crate::table::Table;

/// Cardinality of a relationship
///
/// Serialized as `Object` / `Array`; metadata writes the lowercase form,
/// which is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    #[serde(alias = "object")]
    Object,
    #[serde(alias = "array")]
    Array,
}

/// Descriptor variant, flattened for callers that only need to branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    LocalArray,
    LocalObject,
    RemoteSchema,
    RemoteDatabase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Relationship {
    LocalRelationship(LocalRelationship),
    RemoteSchemaRelationship(RemoteSchemaRelationship),
    RemoteDatabaseRelationship(RemoteDatabaseRelationship),
}

impl Relationship {
    pub fn name(&self) -> &str {
        match self {
            Relationship::LocalRelationship(r) => &r.name,
            Relationship::RemoteSchemaRelationship(r) => &r.name,
            Relationship::RemoteDatabaseRelationship(r) => &r.name,
        }
    }

    pub fn kind(&self) -> RelationshipKind {
        match self {
            Relationship::LocalRelationship(r) => match r.relationship_type {
                RelationshipType::Array => RelationshipKind::LocalArray,
                RelationshipType::Object => RelationshipKind::LocalObject,
            },
            Relationship::RemoteSchemaRelationship(_) => RelationshipKind::RemoteSchema,
            Relationship::RemoteDatabaseRelationship(_) => RelationshipKind::RemoteDatabase,
        }
    }

    pub fn from_table(&self) -> &Table {
        match self {
            Relationship::LocalRelationship(r) => &r.from_table,
            Relationship::RemoteSchemaRelationship(r) => &r.from_table,
            Relationship::RemoteDatabaseRelationship(r) => &r.from_table,
        }
    }
}

/// Relationship between two tables of the same source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRelationship {
    pub name: String,
    pub from_source: String,
    pub from_table: Table,
    pub relationship_type: RelationshipType,
    pub definition: LocalRelationshipDefinition,
    pub origin: LocalRelationshipOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRelationshipDefinition {
    /// `None` when the backing constraint has not been introspected (yet).
    pub to_table: Option<Table>,
    /// Source column → target column
    pub mapping: ColumnMapping,
}

/// Where the column mapping of a local relationship came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LocalRelationshipOrigin {
    ManualConfiguration,
    #[serde(rename_all = "camelCase")]
    ForeignKeyConstraint { constraint_name: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSchemaRelationship {
    pub name: String,
    pub from_source: String,
    pub from_table: Table,
    pub definition: RemoteSchemaDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSchemaDefinition {
    pub remote_schema: String,
    pub lhs_fields: Vec<String>,
    pub remote_field: RemoteField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDatabaseRelationship {
    pub name: String,
    pub from_source: String,
    pub from_table: Table,
    pub relationship_type: RelationshipType,
    pub definition: RemoteDatabaseDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDatabaseDefinition {
    pub to_source: String,
    pub to_table: Table,
    pub mapping: ColumnMapping,
}

/// Column pairs in declaration order
///
/// Serialized as a JSON object. Composite constraints keep the column order
/// reported by the catalog instead of being re-sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping(Vec<(String, String)>);

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair, replacing the target of an already mapped column in place.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == from) {
            Some(pair) => pair.1 = to,
            None => self.0.push((from, to)),
        }
    }

    pub fn get(&self, from: &str) -> Option<&String> {
        self.0
            .iter()
            .find(|(column, _)| column == from)
            .map(|(_, to)| to)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter().map(|(from, to)| (from, to))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ColumnMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = ColumnMapping::new();
        for (from, to) in iter {
            mapping.insert(from, to);
        }
        mapping
    }
}

impl Index<&str> for ColumnMapping {
    type Output = String;

    fn index(&self, from: &str) -> &String {
        match self.get(from) {
            Some(to) => to,
            None => panic!("column {from:?} is not mapped"),
        }
    }
}

impl Serialize for ColumnMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (from, to) in &self.0 {
            map.serialize_entry(from, to)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ColumnMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = ColumnMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping column names to column names")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ColumnMapping, A::Error> {
                let mut mapping = ColumnMapping::new();
                while let Some((from, to)) = access.next_entry::<String, String>()? {
                    mapping.insert(from, to);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}
