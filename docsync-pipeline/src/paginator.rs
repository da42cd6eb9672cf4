//! Paginated reads from a record source.
//!
//! Two strategies are supported: offset windows over the ordered query, and
//! keyset pages filtered on the last primary key seen. Keyset pages stay
//! cheap on large tables; offset windows work for any ordering.

use std::fmt;
use std::str::FromStr;

use docsync_shared::{PrimaryKey, Record};

use crate::errors::SyncError;
use crate::source::{RecordQuery, RecordSource, Window};

/// Pagination strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchType {
    #[default]
    Offset,
    PkFilters,
}

impl BatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offset => "offset",
            Self::PkFilters => "pk_filters",
        }
    }
}

impl fmt::Display for BatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchType {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "offset" => Ok(Self::Offset),
            "pk_filters" | "pk-filters" => Ok(Self::PkFilters),
            other => Err(SyncError::configuration(format!(
                "unknown batch type '{}', choices are: offset, pk_filters",
                other
            ))),
        }
    }
}

/// Yields the records of a query one page at a time.
///
/// The query is ordered by primary key unless it already carries an order,
/// so every record is yielded exactly once.
pub struct Paginator<'a> {
    source: &'a dyn RecordSource,
    query: RecordQuery,
    page_size: usize,
    batch_type: BatchType,
    total: usize,
    fetched: usize,
    last_pk: Option<PrimaryKey>,
}

impl<'a> Paginator<'a> {
    /// Count the query and prepare the first page.
    ///
    /// # Returns
    ///
    /// * `Err(SyncError::LookupMismatch)` - If the query references an
    ///   unknown field
    pub async fn new(
        source: &'a dyn RecordSource,
        query: RecordQuery,
        page_size: usize,
        batch_type: BatchType,
    ) -> Result<Paginator<'a>, SyncError> {
        let query = if query.is_ordered() {
            query
        } else {
            query.ordered_by_pk()
        };
        let total = source.count(&query).await?;

        Ok(Self {
            source,
            query,
            page_size: page_size.max(1),
            batch_type,
            total,
            fetched: 0,
            last_pk: None,
        })
    }

    /// Number of records the query yields.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Next page, `None` once the query is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Record>>, SyncError> {
        let remaining = self.total.saturating_sub(self.fetched);
        if remaining == 0 {
            return Ok(None);
        }
        let limit = remaining.min(self.page_size);

        let page = match self.batch_type {
            BatchType::Offset => {
                self.source
                    .fetch(&self.query, Window::new(self.fetched, limit))
                    .await?
            }
            BatchType::PkFilters => {
                let query = self.query.clone().after(self.last_pk.clone());
                self.source.fetch(&query, Window::new(0, limit)).await?
            }
        };

        // The source shrank since it was counted.
        if page.is_empty() {
            self.fetched = self.total;
            return Ok(None);
        }

        self.fetched += page.len();
        self.last_pk = page.last().map(|record| record.pk.clone());
        Ok(Some(page))
    }
}
