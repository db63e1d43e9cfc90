// SPDX-License-Identifier: Apache-2.0

//! Relationship commands
//!
//! Commands for the relationships panel of a table.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::relationships::{InvalidatedReads, RelationshipService, RelationshipsResult};
use crate::Table;

/// Response wrapper for a relationship listing
#[derive(Debug, Serialize)]
pub struct RelationshipsResponse {
    pub success: bool,
    pub result: Option<RelationshipsResult>,
    pub error: Option<String>,
}

/// Response wrapper for an invalidation
///
/// `invalidated` tells which reads were cached; anything not cached yet is
/// fetched fresh by the next listing anyway.
#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub success: bool,
    pub invalidated: InvalidatedReads,
    pub error: Option<String>,
}

/// Response wrapper for the window focus notification
#[derive(Debug, Serialize)]
pub struct CacheResponse {
    pub success: bool,
    pub refetches: usize,
    pub error: Option<String>,
}

async fn service(state: &crate::SharedState) -> Arc<RelationshipService> {
    let state = state.lock().await;
    Arc::clone(&state.service)
}

/// Lists every relationship of a table
///
/// With `wait = false` the current snapshot is returned immediately and
/// missing reads continue in the background.
#[instrument(skip(state, table), fields(table = %table))]
pub async fn list_database_relationships(
    state: &crate::SharedState,
    data_source_name: String,
    table: Table,
    wait: Option<bool>,
) -> Result<RelationshipsResponse, String> {
    if data_source_name.trim().is_empty() {
        return Ok(RelationshipsResponse {
            success: false,
            result: None,
            error: Some("Data source name is required".to_string()),
        });
    }

    let service = service(state).await;
    let result = if wait.unwrap_or(true) {
        service
            .list_all_database_relationships(&data_source_name, &table)
            .await
    } else {
        service.peek_all_database_relationships(&data_source_name, &table)
    };

    // Partial data is still returned next to read errors.
    let error = result
        .error
        .iter()
        .flatten()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    Ok(RelationshipsResponse {
        success: error.is_empty(),
        error: (!error.is_empty()).then(|| error.join("; ")),
        result: Some(result),
    })
}

/// Forces the next listing of `table` to refetch both reads
pub async fn invalidate_database_relationships(
    state: &crate::SharedState,
    data_source_name: String,
    table: Table,
) -> Result<InvalidateResponse, String> {
    let invalidated = service(state).await.invalidate(&data_source_name, &table);
    Ok(InvalidateResponse {
        success: true,
        invalidated,
        error: None,
    })
}

/// Called when the console window regains focus
pub async fn notify_window_focus(state: &crate::SharedState) -> Result<CacheResponse, String> {
    let refetches = service(state).await.notify_window_focus();
    Ok(CacheResponse {
        success: true,
        refetches,
        error: None,
    })
}
