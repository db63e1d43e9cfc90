// SPDX-License-Identifier: Apache-2.0

//! Console backend configuration
//!
//! Read from the environment (a `.env` file is honoured). Unset values fall
//! back to defaults through the `effective_*` accessors.

use std::time::Duration;

use url::Url;

use crate::observability::Sensitive;
use crate::query::DEFAULT_STALE_TIME;
use crate::RelationsError;

pub const ENDPOINT_ENV: &str = "QORE_RELATIONS_ENDPOINT";
pub const ADMIN_SECRET_ENV: &str = "QORE_RELATIONS_ADMIN_SECRET";
pub const STALE_TIME_ENV: &str = "QORE_RELATIONS_STALE_TIME_SECS";
pub const REQUEST_TIMEOUT_ENV: &str = "QORE_RELATIONS_REQUEST_TIMEOUT_SECS";

const DEFAULT_ENDPOINT: &str = "http://localhost:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Base URL of the server exposing `/v1/metadata` and `/v2/query`
    pub endpoint: Url,
    pub admin_secret: Option<Sensitive<String>>,
    pub stale_time_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl ConsoleConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            admin_secret: None,
            stale_time_secs: None,
            request_timeout_secs: None,
        }
    }

    pub fn from_env() -> Result<Self, RelationsError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelationsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_endpoint = lookup(ENDPOINT_ENV).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(raw_endpoint.trim()).map_err(|e| {
            RelationsError::configuration(format!("{} is not a valid URL: {}", ENDPOINT_ENV, e))
        })?;

        let admin_secret = lookup(ADMIN_SECRET_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(Sensitive::new);

        Ok(Self {
            endpoint,
            admin_secret,
            stale_time_secs: parse_secs(&lookup, STALE_TIME_ENV)?,
            request_timeout_secs: parse_secs(&lookup, REQUEST_TIMEOUT_ENV)?,
        })
    }

    pub fn effective_stale_time(&self) -> Duration {
        self.stale_time_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STALE_TIME)
    }

    pub fn effective_request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
                .max(1),
        )
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<u64>, RelationsError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value.trim().parse::<u64>().map(Some).map_err(|_| {
            RelationsError::configuration(format!("{} must be a number of seconds", key))
        }),
    }
}
