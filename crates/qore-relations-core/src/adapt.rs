// SPDX-License-Identifier: Apache-2.0

//! Relationship adapter
//!
//! Pure mapping from a metadata table record plus the introspected
//! foreign keys to the flat descriptor list. Arrays come first, then
//! objects, then remote relationships; each category keeps metadata order.
//! Manual relationships never look at foreign keys, and foreign-key backed
//! relationships degrade to an empty mapping when no constraint matches.

use std::collections::BTreeSet;

use crate::introspection::TableFkRelationship;
use crate::metadata::{
    ArrayForeignKeyOn, ArrayRelationship, LegacyRemoteSchema, ManualConfiguration, MetadataTable,
    ObjectForeignKeyOn, ObjectRelationship, RelationshipUsing, RemoteRelationship,
    RemoteRelationshipDefinition, RemoteTableColumns, ToRemoteSchema, ToSource,
};
use crate::relationship::{
    ColumnMapping, LocalRelationship, LocalRelationshipDefinition, LocalRelationshipOrigin,
    RemoteDatabaseDefinition, RemoteDatabaseRelationship, RemoteSchemaDefinition,
    RemoteSchemaRelationship, Relationship, RelationshipType,
};
use crate::table::Table;

/// Adapts every relationship of `metadata_table`.
///
/// `fk_constraints` is `None` while introspection is pending and is then
/// treated as an empty constraint set.
pub fn adapt_relationships(
    metadata_table: Option<&MetadataTable>,
    fk_constraints: Option<&[TableFkRelationship]>,
    table: &Table,
    data_source_name: &str,
) -> Vec<Relationship> {
    let Some(metadata_table) = metadata_table else {
        return Vec::new();
    };
    let fk_constraints = fk_constraints.unwrap_or(&[]);

    let local_array = metadata_table.array_relationships.iter().map(|relationship| {
        match &relationship.using {
            RelationshipUsing::ManualConfiguration(config) => {
                adapt_local_array_relationship_with_manual_configuration(
                    table,
                    data_source_name,
                    relationship,
                    config,
                )
            }
            RelationshipUsing::ForeignKeyConstraintOn(fk_on) => {
                adapt_local_array_relationship_with_fk_constraint(
                    table,
                    data_source_name,
                    relationship,
                    fk_on,
                    fk_constraints,
                )
            }
        }
    });

    let local_object = metadata_table.object_relationships.iter().map(|relationship| {
        match &relationship.using {
            RelationshipUsing::ManualConfiguration(config) => {
                adapt_local_object_relationship_with_manual_configuration(
                    table,
                    data_source_name,
                    relationship,
                    config,
                )
            }
            RelationshipUsing::ForeignKeyConstraintOn(fk_on) => {
                adapt_local_object_relationship_with_fk_constraint(
                    table,
                    data_source_name,
                    relationship,
                    fk_on,
                    fk_constraints,
                )
            }
        }
    });

    let remote = metadata_table
        .remote_relationships
        .iter()
        .map(|relationship| adapt_remote_relationship(table, data_source_name, relationship));

    local_array.chain(local_object).chain(remote).collect()
}

fn adapt_remote_relationship(
    table: &Table,
    data_source_name: &str,
    relationship: &RemoteRelationship,
) -> Relationship {
    match &relationship.definition {
        RemoteRelationshipDefinition::RemoteSchema { to_remote_schema } => {
            adapt_remote_schema_relationship(
                table,
                data_source_name,
                &relationship.name,
                to_remote_schema,
            )
        }
        RemoteRelationshipDefinition::LegacyRemoteSchema(legacy) => {
            adapt_legacy_remote_schema_relationship(
                table,
                data_source_name,
                &relationship.name,
                legacy,
            )
        }
        RemoteRelationshipDefinition::RemoteDatabase { to_source } => {
            adapt_remote_database_relationship(table, data_source_name, &relationship.name, to_source)
        }
    }
}

// ==================== Local relationships ====================

fn local_relationship(
    table: &Table,
    data_source_name: &str,
    name: &str,
    relationship_type: RelationshipType,
    definition: LocalRelationshipDefinition,
    origin: LocalRelationshipOrigin,
) -> Relationship {
    Relationship::LocalRelationship(LocalRelationship {
        name: name.to_string(),
        from_source: data_source_name.to_string(),
        from_table: table.clone(),
        relationship_type,
        definition,
        origin,
    })
}

fn manual_definition(config: &ManualConfiguration) -> LocalRelationshipDefinition {
    LocalRelationshipDefinition {
        to_table: Some(config.remote_table.clone()),
        mapping: config.column_mapping.clone(),
    }
}

pub fn adapt_local_array_relationship_with_manual_configuration(
    table: &Table,
    data_source_name: &str,
    relationship: &ArrayRelationship,
    config: &ManualConfiguration,
) -> Relationship {
    local_relationship(
        table,
        data_source_name,
        &relationship.name,
        RelationshipType::Array,
        manual_definition(config),
        LocalRelationshipOrigin::ManualConfiguration,
    )
}

pub fn adapt_local_object_relationship_with_manual_configuration(
    table: &Table,
    data_source_name: &str,
    relationship: &ObjectRelationship,
    config: &ManualConfiguration,
) -> Relationship {
    local_relationship(
        table,
        data_source_name,
        &relationship.name,
        RelationshipType::Object,
        manual_definition(config),
        LocalRelationshipOrigin::ManualConfiguration,
    )
}

pub fn adapt_local_array_relationship_with_fk_constraint(
    table: &Table,
    data_source_name: &str,
    relationship: &ArrayRelationship,
    fk_on: &ArrayForeignKeyOn,
    fk_constraints: &[TableFkRelationship],
) -> Relationship {
    let (definition, constraint_name) = match fk_on {
        ArrayForeignKeyOn::RemoteTable(remote) => resolve_incoming(table, remote, fk_constraints),
        ArrayForeignKeyOn::Constraint(reference) => {
            resolve_named(table, &reference.constraint, fk_constraints)
        }
    };

    local_relationship(
        table,
        data_source_name,
        &relationship.name,
        RelationshipType::Array,
        definition,
        LocalRelationshipOrigin::ForeignKeyConstraint { constraint_name },
    )
}

pub fn adapt_local_object_relationship_with_fk_constraint(
    table: &Table,
    data_source_name: &str,
    relationship: &ObjectRelationship,
    fk_on: &ObjectForeignKeyOn,
    fk_constraints: &[TableFkRelationship],
) -> Relationship {
    let (definition, constraint_name) = match fk_on {
        ObjectForeignKeyOn::Column(column) => {
            resolve_outgoing(table, std::slice::from_ref(column), fk_constraints)
        }
        ObjectForeignKeyOn::Columns(columns) => resolve_outgoing(table, columns, fk_constraints),
        ObjectForeignKeyOn::RemoteTable(remote) => resolve_incoming(table, remote, fk_constraints),
        ObjectForeignKeyOn::Constraint(reference) => {
            resolve_named(table, &reference.constraint, fk_constraints)
        }
    };

    local_relationship(
        table,
        data_source_name,
        &relationship.name,
        RelationshipType::Object,
        definition,
        LocalRelationshipOrigin::ForeignKeyConstraint { constraint_name },
    )
}

// ==================== Constraint resolution ====================

type Resolved = (LocalRelationshipDefinition, Option<String>);

fn same_columns(left: &[String], right: &[String]) -> bool {
    left.len() == right.len()
        && left.iter().collect::<BTreeSet<_>>() == right.iter().collect::<BTreeSet<_>>()
}

fn unresolved(to_table: Option<Table>) -> Resolved {
    (
        LocalRelationshipDefinition {
            to_table,
            mapping: ColumnMapping::new(),
        },
        None,
    )
}

fn outgoing_definition(fk: &TableFkRelationship) -> Resolved {
    let mapping = fk
        .column_pairs()
        .map(|(from, to)| (from.clone(), to.clone()))
        .collect();
    (
        LocalRelationshipDefinition {
            to_table: Some(fk.to.table.clone()),
            mapping,
        },
        Some(fk.constraint_name.clone()),
    )
}

fn incoming_definition(fk: &TableFkRelationship) -> Resolved {
    let mapping = fk
        .column_pairs()
        .map(|(from, to)| (to.clone(), from.clone()))
        .collect();
    (
        LocalRelationshipDefinition {
            to_table: Some(fk.from.table.clone()),
            mapping,
        },
        Some(fk.constraint_name.clone()),
    )
}

/// Constraint declared on `table` itself over `columns`.
fn resolve_outgoing(
    table: &Table,
    columns: &[String],
    fk_constraints: &[TableFkRelationship],
) -> Resolved {
    fk_constraints
        .iter()
        .find(|fk| fk.from.table.same_table(table) && same_columns(&fk.from.columns, columns))
        .map(outgoing_definition)
        .unwrap_or_else(|| unresolved(None))
}

/// Constraint declared on another table that references `table`.
fn resolve_incoming(
    table: &Table,
    remote: &RemoteTableColumns,
    fk_constraints: &[TableFkRelationship],
) -> Resolved {
    let columns = remote.column_names();
    fk_constraints
        .iter()
        .find(|fk| {
            fk.from.table.same_table(&remote.table)
                && fk.to.table.same_table(table)
                && same_columns(&fk.from.columns, &columns)
        })
        .map(incoming_definition)
        .unwrap_or_else(|| unresolved(Some(remote.table.clone())))
}

fn resolve_named(
    table: &Table,
    constraint_name: &str,
    fk_constraints: &[TableFkRelationship],
) -> Resolved {
    let named = fk_constraints
        .iter()
        .filter(|fk| fk.constraint_name == constraint_name);

    for fk in named {
        if fk.from.table.same_table(table) {
            return outgoing_definition(fk);
        }
        if fk.to.table.same_table(table) {
            return incoming_definition(fk);
        }
    }
    unresolved(None)
}

// ==================== Remote relationships ====================

pub fn adapt_remote_schema_relationship(
    table: &Table,
    data_source_name: &str,
    name: &str,
    definition: &ToRemoteSchema,
) -> Relationship {
    Relationship::RemoteSchemaRelationship(RemoteSchemaRelationship {
        name: name.to_string(),
        from_source: data_source_name.to_string(),
        from_table: table.clone(),
        definition: RemoteSchemaDefinition {
            remote_schema: definition.remote_schema.clone(),
            lhs_fields: definition.lhs_fields.clone(),
            remote_field: definition.remote_field.clone(),
        },
    })
}

/// Legacy definitions name the join fields `hasura_fields`; they map onto
/// `lhs_fields` of the current shape.
pub fn adapt_legacy_remote_schema_relationship(
    table: &Table,
    data_source_name: &str,
    name: &str,
    definition: &LegacyRemoteSchema,
) -> Relationship {
    Relationship::RemoteSchemaRelationship(RemoteSchemaRelationship {
        name: name.to_string(),
        from_source: data_source_name.to_string(),
        from_table: table.clone(),
        definition: RemoteSchemaDefinition {
            remote_schema: definition.remote_schema.clone(),
            lhs_fields: definition.hasura_fields.clone(),
            remote_field: definition.remote_field.clone(),
        },
    })
}

pub fn adapt_remote_database_relationship(
    table: &Table,
    data_source_name: &str,
    name: &str,
    definition: &ToSource,
) -> Relationship {
    Relationship::RemoteDatabaseRelationship(RemoteDatabaseRelationship {
        name: name.to_string(),
        from_source: data_source_name.to_string(),
        from_table: table.clone(),
        relationship_type: definition.relationship_type,
        definition: RemoteDatabaseDefinition {
            to_source: definition.source.clone(),
            to_table: definition.table.clone(),
            mapping: definition.field_mapping.clone(),
        },
    })
}
