// SPDX-License-Identifier: Apache-2.0

//! Declared relationship metadata
//!
//! Mirrors the table section of exported server metadata. Each shape that
//! the server distinguishes by the presence of a key becomes a closed enum,
//! so an entry that matches no known shape fails to deserialize instead of
//! being routed to whichever branch happens to come last.
//!
//! Table entries stay raw JSON inside the export and are decoded one at a
//! time by `find_table`, so a malformed entry only affects its own table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelationsError, RelationsResult};
use crate::relationship::{ColumnMapping, RelationshipType};
use crate::table::Table;

/// Response of the `export_metadata` call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataExport {
    pub resource_version: u64,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub version: u32,
    #[serde(default)]
    pub sources: Vec<MetadataSource>,
}

/// A data source (database connection) declared in metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataSource {
    pub name: String,
    pub kind: String,
    /// Undecoded table entries
    #[serde(default)]
    pub tables: Vec<Value>,
}

impl MetadataSource {
    /// Raw entry of `table`, matched on its `table` key alone.
    pub fn table_entry(&self, table: &Table) -> Option<&Value> {
        self.tables.iter().find(|entry| {
            entry
                .get("table")
                .map(|key| Table::from_value(key.clone()).same_table(table))
                .unwrap_or(false)
        })
    }
}

/// One tracked table with its declared relationships
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataTable {
    pub table: Table,
    #[serde(default)]
    pub array_relationships: Vec<ArrayRelationship>,
    #[serde(default)]
    pub object_relationships: Vec<ObjectRelationship>,
    #[serde(default)]
    pub remote_relationships: Vec<RemoteRelationship>,
}

impl MetadataTable {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            array_relationships: Vec::new(),
            object_relationships: Vec::new(),
            remote_relationships: Vec::new(),
        }
    }

    pub fn relationship_count(&self) -> usize {
        self.array_relationships.len()
            + self.object_relationships.len()
            + self.remote_relationships.len()
    }
}

/// Finds and decodes the metadata record of `table` in the source named
/// `data_source_name`.
///
/// Only the selected entry is decoded; an unknown relationship shape in it
/// is reported as `InvalidResponse`.
pub fn find_table(
    metadata: &Metadata,
    data_source_name: &str,
    table: &Table,
) -> RelationsResult<Option<MetadataTable>> {
    let Some(entry) = metadata
        .sources
        .iter()
        .find(|source| source.name == data_source_name)
        .and_then(|source| source.table_entry(table))
    else {
        return Ok(None);
    };

    MetadataTable::deserialize(entry).map(Some).map_err(|e| {
        RelationsError::invalid_response(format!("Malformed metadata for {}: {}", table, e))
    })
}

// ==================== Local relationships ====================

/// A local relationship entry, generic over its foreign-key reference shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalRelationshipEntry<Fk> {
    pub name: String,
    pub using: RelationshipUsing<Fk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

pub type ArrayRelationship = LocalRelationshipEntry<ArrayForeignKeyOn>;
pub type ObjectRelationship = LocalRelationshipEntry<ObjectForeignKeyOn>;

impl<Fk> LocalRelationshipEntry<Fk> {
    pub fn is_manual(&self) -> bool {
        matches!(self.using, RelationshipUsing::ManualConfiguration(_))
    }
}

/// How a local relationship is defined
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipUsing<Fk> {
    ManualConfiguration(ManualConfiguration),
    ForeignKeyConstraintOn(Fk),
}

/// Explicit column mapping that does not rely on a database constraint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManualConfiguration {
    pub remote_table: Table,
    pub column_mapping: ColumnMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insertion_order: Option<InsertionOrder>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsertionOrder {
    BeforeParent,
    AfterParent,
}

/// Foreign-key reference of an array relationship
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ArrayForeignKeyOn {
    RemoteTable(RemoteTableColumns),
    Constraint(ConstraintReference),
}

/// Foreign-key reference of an object relationship
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ObjectForeignKeyOn {
    Column(String),
    Columns(Vec<String>),
    RemoteTable(RemoteTableColumns),
    Constraint(ConstraintReference),
}

/// Columns of another table that reference the current one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RemoteTableColumns {
    pub table: Table,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

impl RemoteTableColumns {
    /// `columns` takes precedence over the single-column form.
    pub fn column_names(&self) -> Vec<String> {
        match (&self.columns, &self.column) {
            (Some(columns), _) => columns.clone(),
            (None, Some(column)) => vec![column.clone()],
            (None, None) => Vec::new(),
        }
    }
}

/// Reference to a database constraint by its name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConstraintReference {
    pub constraint: String,
}

// ==================== Remote relationships ====================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteRelationship {
    pub name: String,
    pub definition: RemoteRelationshipDefinition,
}

/// The three remote relationship shapes found in metadata
///
/// The legacy form predates `to_remote_schema` and is still accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RemoteRelationshipDefinition {
    RemoteSchema { to_remote_schema: ToRemoteSchema },
    RemoteDatabase { to_source: ToSource },
    LegacyRemoteSchema(LegacyRemoteSchema),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToRemoteSchema {
    pub remote_schema: String,
    pub lhs_fields: Vec<String>,
    pub remote_field: RemoteField,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LegacyRemoteSchema {
    pub remote_schema: String,
    pub hasura_fields: Vec<String>,
    pub remote_field: RemoteField,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToSource {
    pub source: String,
    pub table: Table,
    pub relationship_type: RelationshipType,
    pub field_mapping: ColumnMapping,
}

/// Selection path into a remote schema, keyed by field name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RemoteField(pub BTreeMap<String, RemoteFieldSelection>);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteFieldSelection {
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<RemoteField>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_table(value: serde_json::Value) -> MetadataTable {
        serde_json::from_value(value).expect("metadata table should parse")
    }

    #[test]
    fn missing_relationship_lists_default_to_empty() {
        let table = parse_table(json!({ "table": { "schema": "public", "name": "users" } }));
        assert_eq!(table.relationship_count(), 0);
    }

    #[test]
    fn parses_every_local_relationship_shape() {
        let table = parse_table(json!({
            "table": { "schema": "public", "name": "authors" },
            "array_relationships": [
                {
                    "name": "articles",
                    "using": { "manual_configuration": {
                        "remote_table": { "schema": "public", "name": "articles" },
                        "column_mapping": { "id": "author_id" }
                    } }
                },
                {
                    "name": "books",
                    "using": { "foreign_key_constraint_on": {
                        "table": { "schema": "public", "name": "books" },
                        "column": "author_id"
                    } }
                },
                {
                    "name": "reviews",
                    "using": { "foreign_key_constraint_on": { "constraint": "reviews_author_id_fkey" } }
                }
            ],
            "object_relationships": [
                { "name": "country", "using": { "foreign_key_constraint_on": "country_id" } },
                { "name": "address", "using": { "foreign_key_constraint_on": ["street_id", "city_id"] } }
            ]
        }));

        assert!(table.array_relationships[0].is_manual());
        assert!(matches!(
            table.array_relationships[1].using,
            RelationshipUsing::ForeignKeyConstraintOn(ArrayForeignKeyOn::RemoteTable(_))
        ));
        assert!(matches!(
            table.array_relationships[2].using,
            RelationshipUsing::ForeignKeyConstraintOn(ArrayForeignKeyOn::Constraint(_))
        ));
        assert!(matches!(
            table.object_relationships[0].using,
            RelationshipUsing::ForeignKeyConstraintOn(ObjectForeignKeyOn::Column(_))
        ));
        assert!(matches!(
            table.object_relationships[1].using,
            RelationshipUsing::ForeignKeyConstraintOn(ObjectForeignKeyOn::Columns(_))
        ));
    }

    #[test]
    fn parses_remote_relationship_shapes() {
        let table = parse_table(json!({
            "table": "users",
            "remote_relationships": [
                { "name": "profile", "definition": { "to_remote_schema": {
                    "remote_schema": "accounts",
                    "lhs_fields": ["id"],
                    "remote_field": { "profile": { "arguments": { "user_id": "$id" } } }
                } } },
                { "name": "legacy_profile", "definition": {
                    "remote_schema": "accounts",
                    "hasura_fields": ["id"],
                    "remote_field": { "profile": { "arguments": { "user_id": "$id" } } }
                } },
                { "name": "orders", "definition": { "to_source": {
                    "source": "billing",
                    "table": { "schema": "public", "name": "orders" },
                    "relationship_type": "array",
                    "field_mapping": { "id": "user_id" }
                } } }
            ]
        }));

        let kinds: Vec<&str> = table
            .remote_relationships
            .iter()
            .map(|r| match r.definition {
                RemoteRelationshipDefinition::RemoteSchema { .. } => "remote_schema",
                RemoteRelationshipDefinition::LegacyRemoteSchema(_) => "legacy",
                RemoteRelationshipDefinition::RemoteDatabase { .. } => "remote_database",
            })
            .collect();
        assert_eq!(kinds, vec!["remote_schema", "legacy", "remote_database"]);
    }

    #[test]
    fn unknown_remote_shape_is_rejected() {
        let result: Result<MetadataTable, _> = serde_json::from_value(json!({
            "table": "users",
            "remote_relationships": [
                { "name": "mystery", "definition": { "to_lambda": { "url": "http://x" } } }
            ]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn find_table_matches_source_and_table() {
        let metadata: Metadata = serde_json::from_value(json!({
            "version": 3,
            "sources": [
                { "name": "default", "kind": "postgres", "tables": [
                    { "table": { "schema": "public", "name": "users" } }
                ] },
                { "name": "billing", "kind": "postgres", "tables": [
                    { "table": { "schema": "public", "name": "users" },
                      "object_relationships": [
                        { "name": "plan", "using": { "foreign_key_constraint_on": "plan_id" } }
                      ] }
                ] }
            ]
        }))
        .unwrap();

        let users = Table::qualified("public", "users");
        let found = find_table(&metadata, "billing", &users)
            .unwrap()
            .expect("table should be found");
        assert_eq!(found.object_relationships.len(), 1);

        assert!(find_table(&metadata, "missing", &users).unwrap().is_none());
        assert!(find_table(&metadata, "default", &Table::qualified("public", "plans"))
            .unwrap()
            .is_none());
        assert!(find_table(&metadata, "default", &Table::name("users"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn malformed_entry_only_fails_its_own_table() {
        let metadata: Metadata = serde_json::from_value(json!({
            "version": 3,
            "sources": [
                { "name": "default", "kind": "postgres", "tables": [
                    { "table": { "schema": "public", "name": "authors" },
                      "array_relationships": [
                        { "name": "articles", "using": { "manual_configuration": {
                            "remote_table": "articles", "column_mapping": { "id": "author_id" }
                        } } }
                      ] },
                    { "table": { "schema": "public", "name": "other" },
                      "remote_relationships": [
                        { "name": "mystery", "definition": { "to_lambda": { "url": "http://x" } } }
                      ] }
                ] }
            ]
        }))
        .unwrap();

        let authors = find_table(&metadata, "default", &Table::qualified("public", "authors"))
            .unwrap()
            .expect("authors should be found");
        assert_eq!(authors.relationship_count(), 1);

        let err = find_table(&metadata, "default", &Table::qualified("public", "other")).unwrap_err();
        assert!(matches!(err, RelationsError::InvalidResponse { .. }));
    }
}
