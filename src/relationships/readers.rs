// SPDX-License-Identifier: Apache-2.0

//! Cached readers over the two upstream inputs.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::instrument;

use crate::query::{QueryCache, QueryKeys, QueryOptions, QueryState, DEFAULT_STALE_TIME};
use crate::sources::{DataSource, MetadataApi};
use crate::{find_table, MetadataExport, MetadataTable, RelationsResult, Table, TableFkRelationship};

/// Reads the declared metadata of one table out of the cached export.
///
/// Every table shares the single `export_metadata` entry, so one export
/// serves the whole console until it goes stale.
#[derive(Clone)]
pub struct MetadataReader {
    api: MetadataApi,
    cache: QueryCache<MetadataExport>,
    options: QueryOptions,
}

impl MetadataReader {
    pub fn new(api: MetadataApi, stale_time: Duration) -> Self {
        Self {
            api,
            cache: QueryCache::new(),
            options: QueryOptions {
                stale_time,
                refetch_on_window_focus: true,
                ..QueryOptions::default()
            },
        }
    }

    #[instrument(skip(self, table), fields(table = %table))]
    pub async fn find_table(&self, data_source_name: &str, table: &Table) -> QueryState<MetadataTable> {
        let api = self.api.clone();
        let export = self
            .cache
            .fetch(QueryKeys::export_metadata(), self.options, move || {
                let api = api.clone();
                async move { api.export_metadata().await }
            })
            .await;
        select_table(export, data_source_name, table)
    }

    /// Current snapshot; starts a background export when needed.
    pub fn peek_table(&self, data_source_name: &str, table: &Table) -> QueryState<MetadataTable> {
        let api = self.api.clone();
        let export = self
            .cache
            .prefetch(&QueryKeys::export_metadata(), self.options, move || {
                let api = api.clone();
                async move { api.export_metadata().await }
            });
        select_table(export, data_source_name, table)
    }

    pub fn invalidate(&self) -> bool {
        self.cache.invalidate(&QueryKeys::export_metadata())
    }

    pub fn on_window_focus(&self) -> usize {
        self.cache.on_window_focus()
    }
}

/// Decodes only the requested table; a malformed entry fails that table alone.
fn select_table(
    export: QueryState<MetadataExport>,
    data_source_name: &str,
    table: &Table,
) -> QueryState<MetadataTable> {
    export.try_select(|export| find_table(&export.metadata, data_source_name, table))
}

/// Reads the live foreign keys touching one table.
#[derive(Clone)]
pub struct FkConstraintReader {
    source: DataSource,
    cache: QueryCache<Vec<TableFkRelationship>>,
    options: QueryOptions,
}

impl FkConstraintReader {
    pub fn new(source: DataSource, stale_time: Duration) -> Self {
        Self {
            source,
            cache: QueryCache::new(),
            options: QueryOptions {
                stale_time,
                refetch_on_window_focus: false,
                ..QueryOptions::default()
            },
        }
    }

    pub fn with_default_stale_time(source: DataSource) -> Self {
        Self::new(source, DEFAULT_STALE_TIME)
    }

    #[instrument(skip(self, table), fields(table = %table))]
    pub async fn fetch(
        &self,
        data_source_name: &str,
        table: &Table,
    ) -> QueryState<Vec<TableFkRelationship>> {
        let fetcher = self.fetcher(data_source_name, table);
        self.cache
            .fetch(QueryKeys::fk_constraints(table, data_source_name), self.options, fetcher)
            .await
    }

    pub fn peek(&self, data_source_name: &str, table: &Table) -> QueryState<Vec<TableFkRelationship>> {
        let fetcher = self.fetcher(data_source_name, table);
        self.cache.prefetch(
            &QueryKeys::fk_constraints(table, data_source_name),
            self.options,
            fetcher,
        )
    }

    pub fn invalidate(&self, data_source_name: &str, table: &Table) -> bool {
        self.cache
            .invalidate(&QueryKeys::fk_constraints(table, data_source_name))
    }

    pub fn on_window_focus(&self) -> usize {
        self.cache.on_window_focus()
    }

    fn fetcher(
        &self,
        data_source_name: &str,
        table: &Table,
    ) -> impl Fn() -> BoxFuture<'static, RelationsResult<Vec<TableFkRelationship>>> + Send + Sync + 'static
    {
        let source = self.source.clone();
        let data_source_name = data_source_name.to_string();
        let table = table.clone();
        move || {
            let source = source.clone();
            let data_source_name = data_source_name.clone();
            let table = table.clone();
            async move {
                source
                    .get_table_fk_relationships(&data_source_name, &table)
                    .await
            }
            .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::transport::HttpTransport;
    use crate::RelationsError;

    struct CountingTransport {
        calls: AtomicUsize,
        response: Value,
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn post_json(&self, _path: &str, _body: &Value) -> RelationsResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn metadata_response() -> Value {
        json!({
            "resource_version": 3,
            "metadata": { "version": 3, "sources": [
                { "name": "default", "kind": "postgres", "tables": [
                    { "table": { "schema": "public", "name": "users" } },
                    { "table": { "schema": "public", "name": "orders" },
                      "object_relationships": [
                          { "name": "user", "using": { "foreign_key_constraint_on": "user_id" } }
                      ] }
                ] }
            ] }
        })
    }

    #[tokio::test]
    async fn tables_share_one_metadata_export() {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            response: metadata_response(),
        });
        let reader = MetadataReader::new(MetadataApi::new(transport.clone()), DEFAULT_STALE_TIME);

        let orders = reader
            .find_table("default", &Table::qualified("public", "orders"))
            .await;
        let users = reader
            .find_table("default", &Table::qualified("public", "users"))
            .await;
        let missing = reader
            .find_table("billing", &Table::qualified("public", "users"))
            .await;

        assert_eq!(orders.data.map(|t| t.object_relationships.len()), Some(1));
        assert!(users.data.is_some());
        assert!(missing.data.is_none());
        assert!(missing.error.is_none());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_table_does_not_hide_its_neighbours() {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            response: json!({
                "resource_version": 4,
                "metadata": { "version": 3, "sources": [
                    { "name": "default", "kind": "postgres", "tables": [
                        { "table": { "schema": "public", "name": "users" } },
                        { "table": { "schema": "public", "name": "events" },
                          "remote_relationships": [
                              { "name": "hook", "definition": { "to_lambda": { "url": "http://hooks" } } }
                          ] }
                    ] }
                ] }
            }),
        });
        let reader = MetadataReader::new(MetadataApi::new(transport.clone()), DEFAULT_STALE_TIME);

        let users = reader.find_table("default", &Table::name("users")).await;
        assert!(users.data.is_some(), "bare names match qualified entries");
        assert!(users.error.is_none());

        let events = reader
            .find_table("default", &Table::qualified("public", "events"))
            .await;
        assert!(events.data.is_none());
        assert!(matches!(events.error, Some(RelationsError::InvalidResponse { .. })));
        assert!(!events.is_fetching);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn peek_starts_loading_then_serves_cached_data() {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            response: metadata_response(),
        });
        let reader = MetadataReader::new(MetadataApi::new(transport), DEFAULT_STALE_TIME);
        let users = Table::qualified("public", "users");

        let first = reader.peek_table("default", &users);
        assert!(first.is_loading);
        assert!(first.data.is_none());

        reader.find_table("default", &users).await;
        let second = reader.peek_table("default", &users);
        assert!(!second.is_fetching);
        assert!(second.data.is_some());
    }

    #[tokio::test]
    async fn fk_reads_are_cached_per_table() {
        let cell = json!([]).to_string();
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            response: json!({ "result_type": "TuplesOk", "result": [["coalesce"], [cell]] }),
        });
        let reader = FkConstraintReader::with_default_stale_time(DataSource::new(transport.clone()));
        let users = Table::qualified("public", "users");
        let orders = Table::qualified("public", "orders");

        reader.fetch("default", &users).await;
        reader.fetch("default", &users).await;
        reader.fetch("default", &orders).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

        assert!(reader.invalidate("default", &users));
        let refreshed = reader.fetch("default", &users).await;
        assert_eq!(refreshed.data.map(|fks| fks.len()), Some(0));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn window_focus_refetches_metadata_but_not_foreign_keys() {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            response: metadata_response(),
        });
        let metadata = MetadataReader::new(MetadataApi::new(transport.clone()), Duration::from_secs(1));
        let users = Table::qualified("public", "users");
        metadata.find_table("default", &users).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(metadata.on_window_focus(), 1);

        let fks = FkConstraintReader::new(DataSource::new(transport), Duration::from_secs(1));
        let _ = fks.peek("default", &users);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(fks.on_window_focus(), 0);
    }
}
