//! Outcome of a bulk run.

use std::collections::BTreeMap;

use docsync_repository::BulkItemResult;
use docsync_shared::BulkAction;

/// A record that could not be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub index: String,
    pub id: String,
    /// Item status, `None` when the record failed before submission.
    pub status: Option<u16>,
    /// Short reason, used to group failures in summaries.
    pub reason: String,
}

impl ItemFailure {
    pub fn from_item(item: &BulkItemResult) -> Self {
        Self {
            index: item.index.clone(),
            id: item.id.clone(),
            status: Some(item.status),
            reason: item.reason(),
        }
    }
}

/// Counters and failures of a bulk run.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkReport {
    pub document: String,
    pub action: BulkAction,
    /// Records per submitted chunk, in completion order.
    pub chunk_sizes: Vec<usize>,
    /// Records handled so far, whatever their outcome.
    pub processed: usize,
    /// Records the backend accepted in every target index.
    pub succeeded: usize,
    /// Records left out by the document's predicate.
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    /// Records the query yielded.
    pub total: usize,
}

impl BulkReport {
    pub fn new(document: impl Into<String>, action: BulkAction) -> Self {
        Self {
            document: document.into(),
            action,
            chunk_sizes: Vec::new(),
            processed: 0,
            succeeded: 0,
            skipped: 0,
            failures: Vec::new(),
            total: 0,
        }
    }

    pub fn chunks(&self) -> usize {
        self.chunk_sizes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Failure counts grouped by reason.
    pub fn failure_reasons(&self) -> BTreeMap<String, usize> {
        let mut reasons = BTreeMap::new();
        for failure in &self.failures {
            *reasons.entry(failure.reason.clone()).or_insert(0) += 1;
        }
        reasons
    }
}
