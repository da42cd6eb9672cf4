//! OpenSearch implementation of the search backend.
//!
//! This module provides a concrete implementation of `SearchBackend` using
//! OpenSearch, plus the bulk and search wire formats and the index body
//! helpers it relies on.

mod bulk;
mod client;
mod index_config;
mod search;

pub use bulk::{build_bulk_body, parse_bulk_response};
pub use client::OpenSearchBackend;
pub use index_config::{index_body, merge_settings};
pub use search::{parse_search_response, parse_validation};
