// SPDX-License-Identifier: Apache-2.0

// QoreDB Relations - relationship listing for the database console
// Core library

pub mod commands;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod query;
pub mod relationships;
pub mod sources;
pub mod transport;

use std::sync::Arc;
use tokio::sync::Mutex;

pub use qore_relations_core::{
    adapt, adapt_relationships, error, find_table, introspection, metadata, relationship, table,
    FkEndpoint, MetadataExport, MetadataTable, Relationship, RelationshipKind, RelationshipType,
    RelationsError, RelationsResult, Table, TableFkRelationship,
};

use config::ConsoleConfig;
use relationships::RelationshipService;
use sources::{DataSource, MetadataApi};
use transport::{HttpClient, HttpTransport};

pub type SharedState = Arc<Mutex<AppState>>;
pub struct AppState {
    pub config: ConsoleConfig,
    pub service: Arc<RelationshipService>,
}

impl AppState {
    /// Builds the state over a `reqwest` transport to `config.endpoint`.
    pub fn new(config: ConsoleConfig) -> RelationsResult<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(HttpClient::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ConsoleConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let service = RelationshipService::from_sources(
            MetadataApi::new(Arc::clone(&transport)),
            DataSource::new(transport),
            config.effective_stale_time(),
        );

        Self {
            config,
            service: Arc::new(service),
        }
    }
}

/// Initializes logging and builds the shared state from the environment.
pub fn run() -> RelationsResult<SharedState> {
    observability::init_tracing();
    let config = ConsoleConfig::from_env()?;
    tracing::info!(endpoint = %config.endpoint, "Relationship service starting");
    Ok(Arc::new(Mutex::new(AppState::new(config)?)))
}
