//! OpenSearch backend implementation.
//!
//! This module provides the concrete implementation of `SearchBackend`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsAliasParts, IndicesExistsParts,
        IndicesGetParts, IndicesPutMappingParts, IndicesRefreshParts, IndicesValidateQueryParts,
    },
    params::Refresh,
    BulkParts, ClearScrollParts, CountParts, OpenSearch, ScrollParts, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::ConnectionConfig;
use crate::errors::SearchError;
use crate::interfaces::SearchBackend;
use crate::opensearch::bulk::{build_bulk_body, parse_bulk_response};
use crate::opensearch::search::{parse_search_response, parse_validation};
use crate::types::{AliasAction, BulkOperation, BulkResponse, QueryValidation, SearchResponse};

/// How long a scroll context is kept alive between pages.
const SCROLL_KEEP_ALIVE: &str = "1m";

/// Number of document ids fetched per scroll page.
const SCROLL_PAGE_SIZE: u64 = 1000;

/// OpenSearch backend.
///
/// # Example
///
/// ```ignore
/// use docsync_repository::{ConnectionConfig, OpenSearchBackend, BulkOperation};
///
/// let backend = OpenSearchBackend::new(&ConnectionConfig::default_connection("http://localhost:9200"))?;
/// let ops = vec![BulkOperation::index("country", "1", json!({"name": "France"}))];
/// let response = backend.bulk(&ops, false).await?;
/// assert!(!response.has_failures());
/// ```
pub struct OpenSearchBackend {
    client: OpenSearch,
    name: String,
}

impl OpenSearchBackend {
    /// Create a new backend connected to the configured URL.
    ///
    /// # Arguments
    ///
    /// * `config` - Connection name, URL, credentials and timeout
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchBackend)` - A new backend instance
    /// * `Err(SearchError)` - If the URL is invalid or the transport cannot be built
    pub fn new(config: &ConnectionConfig) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(&config.url)
            .map_err(|e| SearchError::configuration(format!("invalid URL {}: {}", config.url, e)))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.timeout);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }

        let transport = builder
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        info!(
            connection = %config.name,
            url = %config.url,
            "Created OpenSearch client"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
            name: config.name.clone(),
        })
    }

    /// Name of the connection this backend was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Turn a non-success response into an error.
    async fn check(response: Response) -> Result<Response, SearchError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "OpenSearch request failed");
        Err(SearchError::from_status(status.as_u16(), body))
    }

    async fn json(response: Response) -> Result<Value, SearchError> {
        let response = Self::check(response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))
    }

    fn hit_ids(page: &Value) -> Vec<String> {
        page.get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| hit.get("_id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
    #[instrument(skip(self, operations), fields(connection = %self.name, count = operations.len()))]
    async fn bulk(
        &self,
        operations: &[BulkOperation],
        refresh: bool,
    ) -> Result<BulkResponse, SearchError> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }

        let body: Vec<JsonBody<Value>> = build_bulk_body(operations)
            .into_iter()
            .map(JsonBody::from)
            .collect();

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body)
            .refresh(if refresh { Refresh::True } else { Refresh::False })
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let value = Self::json(response).await?;
        let parsed = parse_bulk_response(operations, &value)?;

        debug!(took = parsed.took, "Bulk request completed");
        Ok(parsed)
    }

    async fn refresh(&self, indices: &[String]) -> Result<(), SearchError> {
        if indices.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = indices.iter().map(String::as_str).collect();

        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&names))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        Self::check(response).await?;
        debug!(indices = ?indices, "Indices refreshed");
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    #[instrument(skip(self, body), fields(connection = %self.name))]
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        match Self::check(response).await {
            Ok(_) => {
                info!(index = %index, "Index created");
                Ok(())
            }
            Err(SearchError::RequestError { status: 400, body })
                if body.contains("resource_already_exists_exception") =>
            {
                Err(SearchError::IndexAlreadyExists(index.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(connection = %self.name))]
    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        match Self::check(response).await {
            Ok(_) => {
                info!(index = %index, "Index deleted");
                Ok(())
            }
            Err(SearchError::RequestError { status: 404, .. }) => {
                Err(SearchError::IndexNotFound(index.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn put_mapping(&self, index: &str, mappings: &Value) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index]))
            .body(mappings.clone())
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        match Self::check(response).await {
            Ok(_) => Ok(()),
            Err(SearchError::RequestError { status: 404, .. }) => {
                Err(SearchError::IndexNotFound(index.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn count(&self, index: &str) -> Result<u64, SearchError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let value = match Self::json(response).await {
            Err(SearchError::RequestError { status: 404, .. }) => {
                return Err(SearchError::IndexNotFound(index.to_string()))
            }
            other => other?,
        };

        value
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::parse("count response has no count"))
    }

    #[instrument(skip(self), fields(connection = %self.name))]
    async fn document_ids(&self, index: &str) -> Result<Vec<String>, SearchError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .scroll(SCROLL_KEEP_ALIVE)
            .body(json!({
                "size": SCROLL_PAGE_SIZE,
                "_source": false,
                "stored_fields": [],
                "sort": ["_doc"]
            }))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let mut page = Self::json(response).await?;
        let mut ids = Vec::new();

        loop {
            let batch = Self::hit_ids(&page);
            let scroll_id = page
                .get("_scroll_id")
                .and_then(Value::as_str)
                .map(str::to_string);

            let done = batch.is_empty();
            ids.extend(batch);

            let Some(scroll_id) = scroll_id else {
                break;
            };

            if done {
                let cleared = self
                    .client
                    .clear_scroll(ClearScrollParts::None)
                    .body(json!({ "scroll_id": [scroll_id] }))
                    .send()
                    .await;
                if let Err(e) = cleared {
                    warn!(error = %e, "Failed to clear scroll context");
                }
                break;
            }

            let response = self
                .client
                .scroll(ScrollParts::None)
                .body(json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id }))
                .send()
                .await
                .map_err(|e| SearchError::connection(e.to_string()))?;
            page = Self::json(response).await?;
        }

        debug!(index = %index, count = ids.len(), "Collected document ids");
        Ok(ids)
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError> {
        let response = self
            .client
            .indices()
            .get(IndicesGetParts::Index(&[pattern]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let value = match Self::json(response).await {
            Err(SearchError::RequestError { status: 404, .. }) => return Ok(Vec::new()),
            other => other?,
        };

        let mut names: Vec<String> = value
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn alias_exists(&self, index: &str, alias: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::IndexName(&[index], &[alias]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        Ok(response.status_code().is_success())
    }

    #[instrument(skip(self, actions), fields(connection = %self.name, count = actions.len()))]
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError> {
        let body: Vec<Value> = actions.iter().map(AliasAction::to_json).collect();

        let response = self
            .client
            .indices()
            .update_aliases()
            .body(json!({ "actions": body }))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        Self::check(response).await?;
        info!("Aliases updated");
        Ok(())
    }

    #[instrument(skip(self, body), fields(connection = %self.name))]
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let value = match Self::json(response).await {
            Err(SearchError::RequestError { status: 404, .. }) => {
                return Err(SearchError::IndexNotFound(index.to_string()))
            }
            other => other?,
        };

        let parsed = parse_search_response(&value)?;
        debug!(index = %index, took = parsed.took, hits = parsed.hits.len(), "Search completed");
        Ok(parsed)
    }

    async fn validate_query(
        &self,
        index: &str,
        query: &Value,
    ) -> Result<QueryValidation, SearchError> {
        let response = self
            .client
            .indices()
            .validate_query(IndicesValidateQueryParts::Index(&[index]))
            .explain(true)
            .body(json!({ "query": query }))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let value = match Self::json(response).await {
            Err(SearchError::RequestError { status: 404, .. }) => {
                return Err(SearchError::IndexNotFound(index.to_string()))
            }
            other => other?,
        };
        Ok(parse_validation(&value))
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let health = Self::json(response).await?;
        let status = health
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        debug!(status = %status, "OpenSearch cluster status");
        Ok(status == "green" || status == "yellow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_url() {
        let config = ConnectionConfig::default_connection("not a url");
        let result = OpenSearchBackend::new(&config);
        assert!(matches!(result, Err(SearchError::ConfigurationError(_))));
    }

    #[test]
    fn test_new_keeps_connection_name() {
        let config = ConnectionConfig::new("analytics", "http://localhost:9200");
        let backend = OpenSearchBackend::new(&config).unwrap();
        assert_eq!(backend.name(), "analytics");
    }

    #[test]
    fn test_hit_ids() {
        let page = json!({
            "_scroll_id": "abc",
            "hits": {"hits": [{"_id": "1"}, {"_id": "2"}]}
        });
        assert_eq!(OpenSearchBackend::hit_ids(&page), vec!["1", "2"]);
        assert!(OpenSearchBackend::hit_ids(&json!({})).is_empty());
    }
}
