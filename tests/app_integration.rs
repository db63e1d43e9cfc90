use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use qore_relations::commands::relationships::{
    invalidate_database_relationships, list_database_relationships, notify_window_focus,
};
use qore_relations::config::ConsoleConfig;
use qore_relations::relationships::InvalidatedReads;
use qore_relations::relationship::{LocalRelationshipOrigin, RemoteSchemaRelationship};
use qore_relations::transport::{HttpTransport, METADATA_PATH, QUERY_PATH};
use qore_relations::{
    AppState, Relationship, RelationshipKind, RelationsError, RelationsResult, SharedState, Table,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;

enum FkBehaviour {
    Respond(Value),
    Fail(RelationsError),
    Hang,
}

/// Routes metadata and `run_sql` calls to canned answers and counts them.
struct FakeServer {
    metadata: Value,
    fk: FkBehaviour,
    metadata_calls: AtomicUsize,
    fk_calls: AtomicUsize,
}

impl FakeServer {
    fn new(metadata_tables: Value, fk: FkBehaviour) -> Arc<Self> {
        Arc::new(Self {
            metadata: json!({
                "resource_version": 12,
                "metadata": { "version": 3, "sources": [
                    { "name": "default", "kind": "postgres", "tables": metadata_tables }
                ] }
            }),
            fk,
            metadata_calls: AtomicUsize::new(0),
            fk_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl HttpTransport for FakeServer {
    async fn post_json(&self, path: &str, body: &Value) -> RelationsResult<Value> {
        match path {
            METADATA_PATH => {
                assert_eq!(body["type"], "export_metadata");
                self.metadata_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.metadata.clone())
            }
            QUERY_PATH => {
                assert_eq!(body["type"], "run_sql");
                self.fk_calls.fetch_add(1, Ordering::SeqCst);
                match &self.fk {
                    FkBehaviour::Respond(cell) => Ok(json!({
                        "result_type": "TuplesOk",
                        "result": [["coalesce"], [cell.to_string()]]
                    })),
                    FkBehaviour::Fail(err) => Err(err.clone()),
                    FkBehaviour::Hang => futures::future::pending().await,
                }
            }
            other => panic!("unexpected path {other}"),
        }
    }
}

fn articles() -> Table {
    Table::qualified("public", "articles")
}

fn authors() -> Table {
    Table::qualified("public", "authors")
}

fn author_fk_cell() -> Value {
    json!([{
        "constraint_name": "fk_author_id",
        "from_table": { "schema": "public", "name": "articles" },
        "from_columns": ["author_id"],
        "to_table": { "schema": "public", "name": "authors" },
        "to_columns": ["id"]
    }])
}

fn shared_state(server: Arc<FakeServer>) -> SharedState {
    let config = ConsoleConfig::new("http://localhost:8080".parse().unwrap());
    Arc::new(Mutex::new(AppState::with_transport(config, server)))
}

#[tokio::test]
async fn manual_array_relationship_is_listed_while_foreign_keys_load() {
    let server = FakeServer::new(
        json!([{
            "table": { "schema": "public", "name": "authors" },
            "array_relationships": [
                { "name": "articles", "using": { "manual_configuration": {
                    "remote_table": { "schema": "public", "name": "articles" },
                    "column_mapping": { "id": "author_id" }
                } } }
            ]
        }]),
        FkBehaviour::Hang,
    );
    let state = shared_state(server.clone());
    let service = Arc::clone(&state.lock().await.service);

    let pending = service.peek_all_database_relationships("default", &authors());
    assert!(pending.is_loading);
    assert!(pending.data.is_empty());

    // Let the metadata export settle; introspection never answers.
    while service
        .peek_all_database_relationships("default", &authors())
        .data
        .is_empty()
    {
        tokio::task::yield_now().await;
    }

    let result = service.peek_all_database_relationships("default", &authors());
    assert_eq!(result.data.len(), 1);
    assert_eq!(result.data[0].name(), "articles");
    assert_eq!(result.data[0].kind(), RelationshipKind::LocalArray);
    assert!(result.is_loading, "foreign keys are still loading");
    assert!(result.is_fetching);
    assert_eq!(result.error, [None, None]);
}

#[tokio::test]
async fn object_relationship_follows_its_named_constraint() {
    let server = FakeServer::new(
        json!([{
            "table": { "schema": "public", "name": "articles" },
            "object_relationships": [
                { "name": "author", "using": { "foreign_key_constraint_on": { "constraint": "fk_author_id" } } }
            ]
        }]),
        FkBehaviour::Respond(author_fk_cell()),
    );
    let state = shared_state(server);

    let response = list_database_relationships(&state, "default".to_string(), articles(), None)
        .await
        .unwrap();
    assert!(response.success);

    let result = response.result.unwrap();
    assert!(!result.is_loading);
    assert!(!result.is_fetching);
    match &result.data[..] {
        [Relationship::LocalRelationship(author)] => {
            assert_eq!(author.definition.to_table, Some(authors()));
            assert_eq!(author.definition.mapping.get("author_id"), Some(&"id".to_string()));
            assert_eq!(
                author.origin,
                LocalRelationshipOrigin::ForeignKeyConstraint {
                    constraint_name: Some("fk_author_id".to_string())
                }
            );
        }
        other => panic!("expected one local relationship, got {other:?}"),
    }
}

#[tokio::test]
async fn legacy_and_modern_remote_schema_relationships_look_the_same() {
    let server = FakeServer::new(
        json!([{
            "table": { "schema": "public", "name": "authors" },
            "remote_relationships": [
                { "name": "profile", "definition": {
                    "remote_schema": "identity",
                    "hasura_fields": ["id"],
                    "remote_field": { "user": { "arguments": { "id": "$id" } } }
                } },
                { "name": "profile", "definition": { "to_remote_schema": {
                    "remote_schema": "identity",
                    "lhs_fields": ["id"],
                    "remote_field": { "user": { "arguments": { "id": "$id" } } }
                } } }
            ]
        }]),
        FkBehaviour::Respond(json!([])),
    );
    let state = shared_state(server);
    let service = Arc::clone(&state.lock().await.service);

    let result = service
        .list_all_database_relationships("default", &authors())
        .await;

    let remote: Vec<&RemoteSchemaRelationship> = result
        .data
        .iter()
        .map(|relationship| match relationship {
            Relationship::RemoteSchemaRelationship(remote) => remote,
            other => panic!("expected remote schema relationship, got {other:?}"),
        })
        .collect();
    assert_eq!(remote.len(), 2);
    assert_eq!(remote[0], remote[1]);
}

#[tokio::test]
async fn failed_introspection_reports_second_error_slot() {
    let server = FakeServer::new(
        json!([{
            "table": { "schema": "public", "name": "articles" },
            "object_relationships": [
                { "name": "author", "using": { "foreign_key_constraint_on": "author_id" } }
            ]
        }]),
        FkBehaviour::Fail(RelationsError::api(400, "permission denied", Some("access-denied".to_string()))),
    );
    let state = shared_state(server);

    let response = list_database_relationships(&state, "default".to_string(), articles(), Some(true))
        .await
        .unwrap();
    assert!(!response.success);
    assert!(response.error.unwrap().contains("permission denied"));

    let result = response.result.unwrap();
    assert!(result.error[0].is_none());
    assert!(matches!(result.error[1], Some(RelationsError::Api { status: 400, .. })));
    match &result.data[..] {
        [Relationship::LocalRelationship(author)] => {
            assert!(author.definition.to_table.is_none());
            assert!(author.definition.mapping.is_empty());
        }
        other => panic!("expected one local relationship, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_listings_share_requests_until_invalidated() {
    let server = FakeServer::new(
        json!([{ "table": { "schema": "public", "name": "articles" } }]),
        FkBehaviour::Respond(author_fk_cell()),
    );
    let state = shared_state(server.clone());
    let service = Arc::clone(&state.lock().await.service);

    let table = articles();
    let (a, b) = tokio::join!(
        service.list_all_database_relationships("default", &table),
        service.list_all_database_relationships("default", &table),
    );
    assert!(a.data.is_empty() && b.data.is_empty());
    assert_eq!(server.metadata_calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.fk_calls.load(Ordering::SeqCst), 1);

    service
        .list_all_database_relationships("default", &authors())
        .await;
    assert_eq!(server.metadata_calls.load(Ordering::SeqCst), 1, "one export serves every table");
    assert_eq!(server.fk_calls.load(Ordering::SeqCst), 2);

    let invalidated = invalidate_database_relationships(&state, "default".to_string(), articles())
        .await
        .unwrap();
    assert!(invalidated.success);
    assert_eq!(
        invalidated.invalidated,
        InvalidatedReads {
            metadata: true,
            fk_constraints: true
        }
    );
    service
        .list_all_database_relationships("default", &articles())
        .await;
    assert_eq!(server.metadata_calls.load(Ordering::SeqCst), 2);
    assert_eq!(server.fk_calls.load(Ordering::SeqCst), 3);

    let focus = notify_window_focus(&state).await.unwrap();
    assert!(focus.success);
    assert_eq!(focus.refetches, 0, "fresh entries are not refetched on focus");
}

#[tokio::test]
async fn invalidating_an_unread_table_reports_what_was_cached() {
    let server = FakeServer::new(json!([]), FkBehaviour::Respond(json!([])));
    let state = shared_state(server.clone());

    let cold = invalidate_database_relationships(&state, "default".to_string(), articles())
        .await
        .unwrap();
    assert_eq!(
        cold.invalidated,
        InvalidatedReads {
            metadata: false,
            fk_constraints: false
        }
    );

    list_database_relationships(&state, "default".to_string(), authors(), None)
        .await
        .unwrap();
    let response = invalidate_database_relationships(&state, "default".to_string(), articles())
        .await
        .unwrap();
    assert_eq!(
        response.invalidated,
        InvalidatedReads {
            metadata: true,
            fk_constraints: false
        }
    );

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["invalidated"], json!({ "metadata": true, "fkConstraints": false }));
}

#[tokio::test]
async fn bare_table_name_lists_relationships_of_the_qualified_entry() {
    let server = FakeServer::new(
        json!([
            { "table": { "schema": "public", "name": "articles" },
              "object_relationships": [
                  { "name": "author", "using": { "foreign_key_constraint_on": "author_id" } }
              ] },
            { "table": { "schema": "public", "name": "audit" },
              "remote_relationships": [
                  { "name": "hook", "definition": { "to_lambda": { "url": "http://hooks" } } }
              ] }
        ]),
        FkBehaviour::Respond(author_fk_cell()),
    );
    let state = shared_state(server);

    let response = list_database_relationships(&state, "default".to_string(), Table::name("articles"), None)
        .await
        .unwrap();
    assert!(response.success, "an unrelated malformed table is ignored");

    let result = response.result.unwrap();
    match &result.data[..] {
        [Relationship::LocalRelationship(author)] => {
            assert_eq!(author.definition.to_table, Some(authors()));
            assert_eq!(author.definition.mapping.get("author_id"), Some(&"id".to_string()));
        }
        other => panic!("expected one local relationship, got {other:?}"),
    }
}

#[tokio::test]
async fn blank_data_source_is_rejected() {
    let server = FakeServer::new(json!([]), FkBehaviour::Respond(json!([])));
    let state = shared_state(server.clone());

    let response = list_database_relationships(&state, "  ".to_string(), articles(), None)
        .await
        .unwrap();
    assert!(!response.success);
    assert!(response.result.is_none());
    assert_eq!(server.metadata_calls.load(Ordering::SeqCst), 0);
}
