// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::HttpTransport;
use crate::config::ConsoleConfig;
use crate::observability::Sensitive;
use crate::{RelationsError, RelationsResult};

const ADMIN_SECRET_HEADER: &str = "x-hasura-admin-secret";

/// `reqwest`-backed transport
pub struct HttpClient {
    client: Client,
    endpoint: Url,
    admin_secret: Option<Sensitive<String>>,
    timeout_ms: u64,
}

impl HttpClient {
    pub fn new(config: &ConsoleConfig) -> RelationsResult<Self> {
        let timeout = config.effective_request_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelationsError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: base_endpoint(&config.endpoint),
            admin_secret: config.admin_secret.clone(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    fn url_for(&self, path: &str) -> RelationsResult<Url> {
        self.endpoint
            .join(path)
            .map_err(|e| RelationsError::configuration(format!("Invalid request path {}: {}", path, e)))
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn post_json(&self, path: &str, body: &Value) -> RelationsResult<Value> {
        let url = self.url_for(path)?;
        debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        if let Some(secret) = &self.admin_secret {
            request = request.header(ADMIN_SECRET_HEADER, secret.expose().as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RelationsError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                RelationsError::request_failed(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelationsError::request_failed(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let (message, code) =
                extract_api_error(&text).unwrap_or_else(|| (format!("HTTP {}: {}", status, text), None));
            return Err(RelationsError::api(status.as_u16(), message, code));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

/// Endpoint with a trailing slash, so joining keeps a mount prefix such as
/// `/hasura`.
fn base_endpoint(endpoint: &Url) -> Url {
    let mut base = endpoint.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// Pulls `error` / `code` out of the server's error body.
fn extract_api_error(body: &str) -> Option<(String, Option<String>)> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let message = parsed
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| parsed.get("message").and_then(Value::as_str))?;
    let code = parsed.get("code").and_then(Value::as_str).map(String::from);
    Some((message.to_string(), code))
}
