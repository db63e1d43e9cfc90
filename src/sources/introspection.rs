// SPDX-License-Identifier: Apache-2.0

//! Foreign-key introspection over `run_sql`
//!
//! The catalog query aggregates every constraint into a single JSON cell so
//! the response needs no per-column decoding.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::transport::{HttpTransport, QUERY_PATH};
use crate::{RelationsError, RelationsResult, Table, TableFkRelationship};

/// Live view of a data source's catalog
#[derive(Clone)]
pub struct DataSource {
    transport: Arc<dyn HttpTransport>,
}

#[derive(Debug, Deserialize)]
struct FkRow {
    constraint_name: String,
    from_table: Table,
    from_columns: Vec<String>,
    to_table: Table,
    to_columns: Vec<String>,
}

impl From<FkRow> for TableFkRelationship {
    fn from(row: FkRow) -> Self {
        TableFkRelationship::new(
            row.constraint_name,
            (row.from_table, row.from_columns),
            (row.to_table, row.to_columns),
        )
    }
}

impl DataSource {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Lists the foreign keys declared on `table` and those referencing it.
    #[instrument(skip(self, table), fields(table = %table))]
    pub async fn get_table_fk_relationships(
        &self,
        data_source_name: &str,
        table: &Table,
    ) -> RelationsResult<Vec<TableFkRelationship>> {
        let (schema, name) = table.schema_and_name().ok_or_else(|| {
            RelationsError::not_supported(format!(
                "Foreign key introspection needs a schema-qualified table, got {}",
                table
            ))
        })?;

        let body = json!({
            "type": "run_sql",
            "args": {
                "source": data_source_name,
                "sql": fk_constraints_sql(&schema, &name),
                "read_only": true
            }
        });

        let response = self.transport.post_json(QUERY_PATH, &body).await?;
        let relationships = parse_fk_response(&response)?;
        debug!(count = relationships.len(), "Introspected foreign keys");
        Ok(relationships)
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn fk_constraints_sql(schema: &str, table: &str) -> String {
    let schema = quote_literal(schema);
    let table = quote_literal(table);
    format!(
        r#"SELECT COALESCE(json_agg(row_to_json(fk)), '[]'::json)
FROM (
  SELECT
    c.conname AS constraint_name,
    json_build_object('schema', src_ns.nspname, 'name', src.relname) AS from_table,
    (SELECT json_agg(a.attname ORDER BY k.ord)
       FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
       JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum) AS from_columns,
    json_build_object('schema', ref_ns.nspname, 'name', ref.relname) AS to_table,
    (SELECT json_agg(a.attname ORDER BY k.ord)
       FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
       JOIN pg_attribute a ON a.attrelid = c.confrelid AND a.attnum = k.attnum) AS to_columns
  FROM pg_constraint c
  JOIN pg_class src ON src.oid = c.conrelid
  JOIN pg_namespace src_ns ON src_ns.oid = src.relnamespace
  JOIN pg_class ref ON ref.oid = c.confrelid
  JOIN pg_namespace ref_ns ON ref_ns.oid = ref.relnamespace
  WHERE c.contype = 'f'
    AND ((src_ns.nspname = {schema} AND src.relname = {table})
      OR (ref_ns.nspname = {schema} AND ref.relname = {table}))
  ORDER BY c.conname
) fk"#
    )
}

/// Decodes `{"result_type": "TuplesOk", "result": [[header], [cell]]}`.
fn parse_fk_response(response: &Value) -> RelationsResult<Vec<TableFkRelationship>> {
    let cell = response
        .get("result")
        .and_then(Value::as_array)
        .and_then(|rows| rows.get(1))
        .and_then(Value::as_array)
        .and_then(|row| row.first())
        .ok_or_else(|| RelationsError::invalid_response("run_sql returned no result row"))?;

    // Depending on the server version the JSON cell arrives as text or inline.
    let rows: Vec<FkRow> = match cell {
        Value::String(text) => serde_json::from_str(text)?,
        other => serde_json::from_value(other.clone())?,
    };

    Ok(rows.into_iter().map(TableFkRelationship::from).collect())
}
