//! Search backend error types.
//!
//! This module defines the errors that can occur while talking to the search
//! backend. Per-document failures inside a bulk request are not errors at
//! this level; they are reported item by item in a
//! [`BulkResponse`](crate::types::BulkResponse).

use thiserror::Error;

/// Errors that can occur during search backend operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// The backend could not be reached or answered with a gateway error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backend rejected the request as a whole.
    #[error("Request failed with status {status}: {body}")]
    RequestError { status: u16, body: String },

    /// The targeted index does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// The index to create already exists.
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// Failed to parse the response from the backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The configuration does not allow building a client.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl SearchError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a request error from a status code and response body.
    pub fn request(status: u16, body: impl Into<String>) -> Self {
        Self::RequestError {
            status,
            body: body.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Map a non-success status to an error.
    ///
    /// Gateway and availability statuses mean the backend is unreachable;
    /// everything else is a rejected request.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            502..=504 => Self::ConnectionError(format!("backend answered {}: {}", status, body.into())),
            _ => Self::request(status, body),
        }
    }

    /// Whether the backend itself is unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}
