//! Request and response types for search backend operations.

use docsync_shared::BulkAction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One operation of a bulk request.
///
/// `source` holds the full document for index and create operations, the
/// partial document for update operations and nothing for deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    /// The bulk operation to apply.
    pub action: BulkAction,
    /// Target index (or alias).
    pub index: String,
    /// Document identifier.
    pub id: String,
    /// Document body.
    pub source: Option<Value>,
}

impl BulkOperation {
    /// Create an index (create-or-replace) operation.
    pub fn index(index: impl Into<String>, id: impl Into<String>, source: Value) -> Self {
        Self {
            action: BulkAction::Index,
            index: index.into(),
            id: id.into(),
            source: Some(source),
        }
    }

    /// Create a partial update operation.
    pub fn update(index: impl Into<String>, id: impl Into<String>, doc: Value) -> Self {
        Self {
            action: BulkAction::Update,
            index: index.into(),
            id: id.into(),
            source: Some(doc),
        }
    }

    /// Create a delete operation.
    pub fn delete(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            action: BulkAction::Delete,
            index: index.into(),
            id: id.into(),
            source: None,
        }
    }
}

/// Error reported by the backend for one bulk item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    /// Backend error type (e.g. `mapper_parsing_exception`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Human readable reason.
    pub reason: String,
}

/// Outcome of a single bulk item.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    /// The operation that was applied.
    pub action: BulkAction,
    /// The index the item was applied to.
    pub index: String,
    /// Document identifier.
    pub id: String,
    /// HTTP status of the item.
    pub status: u16,
    /// Backend result (`created`, `updated`, `deleted`, `not_found`, ...).
    pub result: Option<String>,
    /// Error details if the item failed.
    pub error: Option<ItemError>,
}

impl BulkItemResult {
    /// Whether the item succeeded.
    ///
    /// Deleting a document that does not exist is a success: deletes are
    /// idempotent.
    pub fn succeeded(&self) -> bool {
        if self.action == BulkAction::Delete && self.status == 404 {
            return true;
        }
        (200..300).contains(&self.status) && self.error.is_none()
    }

    /// Whether the failure is transient and the item may be retried.
    pub fn is_transient(&self) -> bool {
        !self.succeeded() && matches!(self.status, 429 | 503)
    }

    /// Short failure reason, used to group failures in summaries.
    pub fn reason(&self) -> String {
        match (&self.error, &self.result) {
            (Some(error), _) => error.kind.clone(),
            (None, Some(result)) => result.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

/// Parsed response of a bulk request.
///
/// Items are in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    /// Time the backend spent on the request, in milliseconds.
    pub took: u64,
    /// Individual item results.
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    /// Whether any item failed.
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|item| !item.succeeded())
    }
}

/// One hit of a search response.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub index: String,
    /// Document identifier.
    pub id: String,
    pub score: Option<f64>,
    /// Stored document, `None` when the search asked for no source.
    pub source: Option<Value>,
}

/// Parsed response of a search request. Hits are in rank order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub took: u64,
    /// Number of matching documents, which may exceed the hits returned.
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.id.as_str()).collect()
    }
}

/// Outcome of validating a query against an index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryValidation {
    pub valid: bool,
    /// Why the query is invalid, empty when it is valid.
    pub errors: Vec<String>,
}

/// One action of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasAction {
    /// Point `alias` at `index`.
    Add { index: String, alias: String },
    /// Detach `alias` from `index`.
    Remove { index: String, alias: String },
    /// Drop a concrete index in the same atomic step, so its name can be
    /// reused as an alias.
    RemoveIndex { index: String },
}

impl AliasAction {
    /// The action in the backend's update-aliases format.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Add { index, alias } => {
                serde_json::json!({ "add": { "index": index, "alias": alias } })
            }
            Self::Remove { index, alias } => {
                serde_json::json!({ "remove": { "index": index, "alias": alias } })
            }
            Self::RemoveIndex { index } => serde_json::json!({ "remove_index": { "index": index } }),
        }
    }
}
