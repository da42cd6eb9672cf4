//! Error types for the docsync pipeline.

use docsync_repository::SearchError;
use docsync_shared::LookupError;
use thiserror::Error;

use crate::pipeline::ItemFailure;

/// Coarse classification of a [`SyncError`], used for reporting and for
/// choosing a process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BackendUnavailable,
    DocumentRejected,
    Configuration,
    LookupMismatch,
    NotFound,
    Serialization,
    Task,
    Backend,
}

/// Errors that can occur while syncing records to the search backend.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The backend could not be reached, even after retries.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// One or more documents were rejected by the backend or could not be
    /// prepared.
    #[error("{} document(s) rejected, first: {}", .failures.len(), first_failure(.failures))]
    DocumentRejected { failures: Vec<ItemFailure> },

    /// Invalid registration, settings or command arguments.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A filter or exclude names a field the model does not have.
    #[error("Lookup mismatch: {0}")]
    LookupMismatch(String),

    /// An index, version or record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A document or task payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deferred task could not be submitted or executed.
    #[error("Task error: {0}")]
    Task(String),

    /// Any other backend error.
    #[error("Search error: {0}")]
    Backend(SearchError),
}

fn first_failure(failures: &[ItemFailure]) -> String {
    failures
        .first()
        .map(|failure| format!("{} ({})", failure.id, failure.reason))
        .unwrap_or_default()
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a lookup mismatch error.
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::LookupMismatch(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a task error.
    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::DocumentRejected { .. } => ErrorKind::DocumentRejected,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::LookupMismatch(_) => ErrorKind::LookupMismatch,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Task(_) => ErrorKind::Task,
            Self::Backend(_) => ErrorKind::Backend,
        }
    }
}

impl From<SearchError> for SyncError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::ConnectionError(msg) => Self::BackendUnavailable(msg),
            SearchError::IndexNotFound(index) => Self::NotFound(format!("index '{}'", index)),
            SearchError::ConfigurationError(msg) => Self::Configuration(msg),
            SearchError::SerializationError(msg) => Self::Serialization(msg),
            other => Self::Backend(other),
        }
    }
}

impl From<LookupError> for SyncError {
    fn from(err: LookupError) -> Self {
        Self::LookupMismatch(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_error_classification() {
        let unavailable: SyncError = SearchError::connection("refused").into();
        assert_eq!(unavailable.kind(), ErrorKind::BackendUnavailable);

        let missing: SyncError = SearchError::IndexNotFound("country".into()).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let rejected: SyncError = SearchError::request(400, "bad").into();
        assert_eq!(rejected.kind(), ErrorKind::Backend);
    }

    #[test]
    fn test_rejected_message() {
        let err = SyncError::DocumentRejected {
            failures: vec![ItemFailure {
                index: "country".into(),
                id: "7".into(),
                status: Some(400),
                reason: "mapper_parsing_exception".into(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 document(s) rejected, first: 7 (mapper_parsing_exception)"
        );
        assert_eq!(err.kind(), ErrorKind::DocumentRejected);
    }
}
