// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for relationship reads
//!
//! Transport, server and decoding failures are mapped to these unified
//! error types so both upstream readers report errors the same way.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for metadata and introspection reads
///
/// `Clone` because a single failed request is shared by every caller
/// waiting on the same cache key.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelationsError {
    #[error("Request failed: {message}")]
    RequestFailed { message: String },

    #[error("Server returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Feature not supported: {message}")]
    NotSupported { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RelationsError {
    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed { message: msg.into() }
    }

    pub fn api(status: u16, msg: impl Into<String>, code: Option<String>) -> Self {
        Self::Api {
            status,
            message: msg.into(),
            code,
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse { message: msg.into() }
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported { message: msg.into() }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }
}

impl From<serde_json::Error> for RelationsError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_response(err.to_string())
    }
}

/// Result type alias for relationship reads
pub type RelationsResult<T> = Result<T, RelationsError>;
