//! Record sources.
//!
//! A [`RecordSource`] answers counted, ordered, windowed queries over the
//! records of one model. The pipeline never loads a whole model at once: it
//! asks for one window at a time.

mod memory;

pub use memory::MemorySource;

use std::collections::BTreeSet;

use async_trait::async_trait;
use docsync_shared::{Lookup, ModelName, PrimaryKey, Record};

use crate::errors::SyncError;

/// Order in which a query yields its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrder {
    /// Whatever order the source stores records in.
    #[default]
    Unordered,
    /// Ascending primary key.
    PkAscending,
}

/// Query over the records of one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    /// Records must match every filter.
    pub filters: Vec<Lookup>,
    /// Records matching any exclude are left out.
    pub excludes: Vec<Lookup>,
    /// Primary keys to leave out.
    pub exclude_pks: BTreeSet<PrimaryKey>,
    /// Only records with a greater primary key.
    pub after_pk: Option<PrimaryKey>,
    /// Cap on the number of records the query yields.
    pub limit: Option<usize>,
    pub order: RecordOrder,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, lookup: Lookup) -> Self {
        self.filters.push(lookup);
        self
    }

    pub fn exclude(mut self, lookup: Lookup) -> Self {
        self.excludes.push(lookup);
        self
    }

    pub fn excluding_pks(mut self, pks: impl IntoIterator<Item = PrimaryKey>) -> Self {
        self.exclude_pks.extend(pks);
        self
    }

    pub fn after(mut self, pk: Option<PrimaryKey>) -> Self {
        self.after_pk = pk;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn ordered_by_pk(mut self) -> Self {
        self.order = RecordOrder::PkAscending;
        self
    }

    pub fn is_ordered(&self) -> bool {
        self.order != RecordOrder::Unordered
    }

    /// Every lookup of the query, filters first.
    pub fn lookups(&self) -> impl Iterator<Item = &Lookup> {
        self.filters.iter().chain(self.excludes.iter())
    }
}

/// A slice of a query's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// Supplies the records of one model.
///
/// Implementations are shared between concurrent runs and must be safe for
/// concurrent use.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Model whose records this source yields.
    fn model(&self) -> &ModelName;

    /// Number of records the query yields, honoring `limit`.
    ///
    /// # Returns
    ///
    /// * `Err(SyncError::LookupMismatch)` - If a lookup names an unknown field
    async fn count(&self, query: &RecordQuery) -> Result<usize, SyncError>;

    /// One window of the query's results.
    ///
    /// The query's `limit` applies before the window.
    async fn fetch(&self, query: &RecordQuery, window: Window) -> Result<Vec<Record>, SyncError>;
}
