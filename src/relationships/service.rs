// SPDX-License-Identifier: Apache-2.0

//! Composition of the two readers into one relationship list

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::readers::{FkConstraintReader, MetadataReader};
use crate::query::QueryState;
use crate::sources::{DataSource, MetadataApi};
use crate::{
    adapt_relationships, MetadataTable, Relationship, RelationsError, Table, TableFkRelationship,
};

/// Combined view over both reads
///
/// `error` is positional: slot 0 is the metadata read, slot 1 the
/// foreign-key read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipsResult {
    pub data: Vec<Relationship>,
    pub is_fetching: bool,
    pub is_loading: bool,
    pub error: [Option<RelationsError>; 2],
}

impl RelationshipsResult {
    pub fn has_error(&self) -> bool {
        self.error.iter().any(Option::is_some)
    }
}

/// Which cached reads an invalidation found and marked stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidatedReads {
    pub metadata: bool,
    pub fk_constraints: bool,
}

pub struct RelationshipService {
    metadata: MetadataReader,
    fk_constraints: FkConstraintReader,
}

impl RelationshipService {
    pub fn new(metadata: MetadataReader, fk_constraints: FkConstraintReader) -> Self {
        Self {
            metadata,
            fk_constraints,
        }
    }

    /// Builds both readers over the same upstream sources and stale window.
    pub fn from_sources(api: MetadataApi, source: DataSource, stale_time: Duration) -> Self {
        Self::new(
            MetadataReader::new(api, stale_time),
            FkConstraintReader::new(source, stale_time),
        )
    }

    /// Lists every relationship of `table`, awaiting whichever read is
    /// missing or stale.
    #[instrument(skip(self, table), fields(table = %table))]
    pub async fn list_all_database_relationships(
        &self,
        data_source_name: &str,
        table: &Table,
    ) -> RelationshipsResult {
        let (metadata, fk_constraints) = tokio::join!(
            self.metadata.find_table(data_source_name, table),
            self.fk_constraints.fetch(data_source_name, table),
        );

        let result = compose_relationships(&metadata, &fk_constraints, table, data_source_name);
        debug!(
            count = result.data.len(),
            has_error = result.has_error(),
            "Composed relationships"
        );
        result
    }

    /// Same composition over current snapshots; never waits on the network.
    pub fn peek_all_database_relationships(
        &self,
        data_source_name: &str,
        table: &Table,
    ) -> RelationshipsResult {
        let metadata = self.metadata.peek_table(data_source_name, table);
        let fk_constraints = self.fk_constraints.peek(data_source_name, table);
        compose_relationships(&metadata, &fk_constraints, table, data_source_name)
    }

    /// Marks the metadata export and the table's constraints stale.
    pub fn invalidate(&self, data_source_name: &str, table: &Table) -> InvalidatedReads {
        let invalidated = InvalidatedReads {
            metadata: self.metadata.invalidate(),
            fk_constraints: self.fk_constraints.invalidate(data_source_name, table),
        };
        info!(
            table = %table,
            data_source = data_source_name,
            metadata_cached = invalidated.metadata,
            fk_cached = invalidated.fk_constraints,
            "Invalidated relationship reads"
        );
        invalidated
    }

    /// Returns how many background refetches were started.
    pub fn notify_window_focus(&self) -> usize {
        self.metadata.on_window_focus() + self.fk_constraints.on_window_focus()
    }
}

/// Adapts whatever each read currently holds and merges the status flags.
pub fn compose_relationships(
    metadata: &QueryState<MetadataTable>,
    fk_constraints: &QueryState<Vec<TableFkRelationship>>,
    table: &Table,
    data_source_name: &str,
) -> RelationshipsResult {
    let data = adapt_relationships(
        metadata.data.as_deref(),
        fk_constraints.data.as_deref().map(Vec::as_slice),
        table,
        data_source_name,
    );

    RelationshipsResult {
        data,
        is_fetching: metadata.is_fetching || fk_constraints.is_fetching,
        is_loading: metadata.is_loading || fk_constraints.is_loading,
        error: [metadata.error.clone(), fk_constraints.error.clone()],
    }
}
