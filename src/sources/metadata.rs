// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use serde_json::json;
use tracing::instrument;

use crate::transport::{HttpTransport, METADATA_PATH};
use crate::{MetadataExport, RelationsResult};

/// Client for the server's metadata API
#[derive(Clone)]
pub struct MetadataApi {
    transport: Arc<dyn HttpTransport>,
}

impl MetadataApi {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Exports the full metadata document.
    ///
    /// Fails with `InvalidResponse` if any relationship has a shape this
    /// crate does not know about.
    #[instrument(skip(self))]
    pub async fn export_metadata(&self) -> RelationsResult<MetadataExport> {
        let body = json!({
            "type": "export_metadata",
            "version": 2,
            "args": {}
        });
        let response = self.transport.post_json(METADATA_PATH, &body).await?;
        Ok(serde_json::from_value(response)?)
    }
}
