//! Error types for the docsync repository.

mod search_error;

pub use search_error::SearchError;
