//! GitLab API Error Types
//!
//! Every error carries enough context (method, URL, operation) to tell what was
//! being fetched when it failed.

use reqwest::{Method, StatusCode};

/// Error types for GitLab API operations
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid endpoint or limiter configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request body could not be encoded
    #[error("could not encode body: {0}")]
    Encode(#[source] serde_json::Error),

    /// Connection, DNS, TLS or timeout failure
    #[error("request {method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with something other than 200
    #[error("failed: {status}\nreq {method} {url}")]
    Status {
        status: StatusCode,
        method: Method,
        url: String,
    },

    /// Response body could not be read
    #[error("could not read body of {method} {url}: {source}")]
    Body {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body is not the JSON we expected
    #[error("could not decode body into json: {source}\n{body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    /// The cancellation signal fired
    #[error("request canceled")]
    Canceled,

    /// An error annotated with the operation that produced it
    #[error("error {operation}: {source}")]
    Context {
        operation: String,
        #[source]
        source: Box<ApiError>,
    },
}

impl ApiError {
    /// Wrap this error with the name of the failing operation
    pub fn context(self, operation: impl Into<String>) -> Self {
        ApiError::Context {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// Whether the root cause is cancellation
    pub fn is_canceled(&self) -> bool {
        match self {
            ApiError::Canceled => true,
            ApiError::Context { source, .. } => source.is_canceled(),
            _ => false,
        }
    }

    /// HTTP status of the root cause, if it was a status failure
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Context { source, .. } => source.status(),
            _ => None,
        }
    }
}
