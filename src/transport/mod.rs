// SPDX-License-Identifier: Apache-2.0

//! Transport abstraction
//!
//! Upstream readers never talk to `reqwest` directly; they go through
//! `HttpTransport` so tests and embedders can swap the wire.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::RelationsResult;

pub use http::HttpClient;

/// Path of the metadata API
pub const METADATA_PATH: &str = "v1/metadata";
/// Path of the query API used for `run_sql`
pub const QUERY_PATH: &str = "v2/query";

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POSTs `body` as JSON to `path` (relative to the endpoint) and returns
    /// the decoded JSON response.
    async fn post_json(&self, path: &str, body: &Value) -> RelationsResult<Value>;
}
