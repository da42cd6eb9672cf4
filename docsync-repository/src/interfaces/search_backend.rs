//! Search backend trait definition.
//!
//! This module defines the abstract interface for the search backend,
//! allowing for different implementations (OpenSearch, in-memory mocks, etc.).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchError;
use crate::types::{AliasAction, BulkOperation, BulkResponse, QueryValidation, SearchResponse};

/// Abstracts the search backend docsync writes to.
///
/// Implementations are shared behind an `Arc` by every pipeline invocation
/// and must be safe for concurrent use.
///
/// All methods return `Result<T, SearchError>`. A `ConnectionError` means the
/// backend could not be reached; per-document failures of a bulk request are
/// reported in the returned [`BulkResponse`] instead.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Submit operations as one bulk request.
    ///
    /// # Arguments
    ///
    /// * `operations` - The operations, submitted in order
    /// * `refresh` - Whether the affected shards are refreshed before returning
    ///
    /// # Returns
    ///
    /// * `Ok(BulkResponse)` - One item result per operation, in request order
    /// * `Err(SearchError)` - If the request as a whole failed
    async fn bulk(
        &self,
        operations: &[BulkOperation],
        refresh: bool,
    ) -> Result<BulkResponse, SearchError>;

    /// Make recent writes on the given indices visible to search.
    async fn refresh(&self, indices: &[String]) -> Result<(), SearchError>;

    /// Check whether an index (or alias) exists.
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    /// Create an index with the given settings and mappings body.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was created
    /// * `Err(SearchError::IndexAlreadyExists)` - If the index already exists
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError>;

    /// Delete an index.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was deleted
    /// * `Err(SearchError::IndexNotFound)` - If the index does not exist
    async fn delete_index(&self, index: &str) -> Result<(), SearchError>;

    /// Replace the mappings of an existing index.
    async fn put_mapping(&self, index: &str, mappings: &Value) -> Result<(), SearchError>;

    /// Number of documents in an index.
    async fn count(&self, index: &str) -> Result<u64, SearchError>;

    /// Identifiers of every document stored in an index.
    async fn document_ids(&self, index: &str) -> Result<Vec<String>, SearchError>;

    /// Names of the concrete indices matching a pattern, sorted by name.
    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError>;

    /// Whether `alias` points at `index`.
    async fn alias_exists(&self, index: &str, alias: &str) -> Result<bool, SearchError>;

    /// Apply alias actions atomically.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError>;

    /// Run a search request against an index (or alias).
    ///
    /// # Arguments
    ///
    /// * `index` - The index or alias to search
    /// * `body` - The full search body (`query`, `size`, `_source`, ...)
    ///
    /// # Returns
    ///
    /// * `Ok(SearchResponse)` - The hits in rank order
    /// * `Err(SearchError::IndexNotFound)` - If the index does not exist
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError>;

    /// Ask the backend whether `query` is valid for `index`.
    ///
    /// An invalid query is not an error: it is reported in the returned
    /// [`QueryValidation`] with the backend's explanations.
    async fn validate_query(
        &self,
        index: &str,
        query: &Value,
    ) -> Result<QueryValidation, SearchError>;

    /// Check if the backend is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the cluster is green or yellow
    /// * `Ok(false)` - If the cluster is red
    /// * `Err(SearchError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchError>;
}
