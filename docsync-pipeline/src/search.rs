//! Searching a document's index and mapping the hits back to records.

use std::collections::BTreeMap;
use std::sync::Arc;

use docsync_repository::{QueryValidation, SearchBackend, SearchHit, SearchResponse};
use docsync_shared::{FilterValue, Lookup, LookupOp, PrimaryKey, Record};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::document::{pk_filter, Document};
use crate::errors::SyncError;
use crate::source::{RecordQuery, RecordSource, Window};

/// Hits returned when no size is given.
pub const DEFAULT_SEARCH_SIZE: u64 = 10;

/// A query against the index of one document.
///
/// Hit ids are read back as primary keys, so documents overriding
/// `generate_id` cannot be mapped back to records.
pub struct DocumentSearch {
    document: Arc<dyn Document>,
    backend: Arc<dyn SearchBackend>,
    index: String,
    query: Value,
    size: u64,
}

impl DocumentSearch {
    /// Search the first index of `document` with `match_all`.
    ///
    /// # Returns
    ///
    /// * `Err(SyncError::Configuration)` - If the document has no index
    pub fn new(document: Arc<dyn Document>, backend: Arc<dyn SearchBackend>) -> Result<Self, SyncError> {
        let index = document
            .definition()
            .index_names()
            .into_iter()
            .next()
            .ok_or_else(|| {
                SyncError::configuration(format!(
                    "document '{}' has no index to search",
                    document.definition().name
                ))
            })?;

        Ok(Self {
            document,
            backend,
            index,
            query: json!({ "match_all": {} }),
            size: DEFAULT_SEARCH_SIZE,
        })
    }

    /// Search another index (or version) of the document.
    pub fn on_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn body(&self) -> Value {
        json!({ "query": self.query, "size": self.size })
    }

    /// Run the search, documents included.
    pub async fn execute(&self) -> Result<SearchResponse, SyncError> {
        Ok(self.backend.search(&self.index, &self.body()).await?)
    }

    /// Records of the matching documents.
    ///
    /// Only ids are fetched from the backend; the records come from the
    /// document's source. With `keep_order` they follow the hit ranking,
    /// otherwise primary key order. Hits without a record are left out.
    #[instrument(skip(self), fields(index = %self.index))]
    pub async fn to_records(&self, keep_order: bool) -> Result<Vec<Record>, SyncError> {
        let mut body = self.body();
        body["_source"] = Value::Bool(false);

        let response = self.backend.search(&self.index, &body).await?;
        debug!(hits = response.hits.len(), total = response.total, "Mapping hits to records");
        records_for_hits(self.document.source(), &response.hits, keep_order).await
    }

    /// Ask the backend whether the query is valid, with its explanations.
    pub async fn validate(&self) -> Result<QueryValidation, SyncError> {
        Ok(self.backend.validate_query(&self.index, &self.query).await?)
    }
}

/// Load the records behind `hits` with a single `pk__in` query.
///
/// # Returns
///
/// * `Ok(Vec<Record>)` - Ranked like `hits` with `keep_order`, by primary
///   key otherwise
/// * `Err(SyncError)` - If the source cannot answer the query
pub async fn records_for_hits(
    source: &dyn RecordSource,
    hits: &[SearchHit],
    keep_order: bool,
) -> Result<Vec<Record>, SyncError> {
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    let pks: Vec<PrimaryKey> = hits.iter().map(|hit| PrimaryKey::parse(&hit.id)).collect();
    let query = RecordQuery::new()
        .filter(Lookup::new(
            "pk",
            LookupOp::In,
            FilterValue::List(pks.iter().map(pk_filter).collect()),
        ))
        .ordered_by_pk();

    let total = source.count(&query).await?;
    let mut records = source.fetch(&query, Window::new(0, total)).await?;

    if keep_order {
        let mut rank: BTreeMap<&PrimaryKey, usize> = BTreeMap::new();
        for (position, pk) in pks.iter().enumerate() {
            rank.entry(pk).or_insert(position);
        }
        records.sort_by_key(|record| rank.get(&record.pk).copied().unwrap_or(usize::MAX));
    }
    Ok(records)
}
