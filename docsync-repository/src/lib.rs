//! # docsync repository
//!
//! This crate provides the trait and implementations for talking to the
//! search backend. It includes the backend error type, the bulk request and
//! response types, connection configuration, and a concrete implementation
//! for OpenSearch.

pub mod config;
pub mod connections;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use config::ConnectionConfig;
pub use connections::Connections;
pub use errors::SearchError;
pub use interfaces::SearchBackend;
pub use opensearch::OpenSearchBackend;
pub use types::{
    AliasAction, BulkItemResult, BulkOperation, BulkResponse, ItemError, QueryValidation,
    SearchHit, SearchResponse,
};
