//! Index and document management.
//!
//! The operations behind the command line: creating, deleting, rebuilding
//! and updating indices, listing their state, and running bulk actions over
//! the documents of selected indices.

mod document;
mod index;

pub use document::{DocumentCommand, DocumentManager, DocumentPlan, EntryResult, PlanEntry};
pub use index::{IndexCommand, IndexManager, IndexOutcome, IndexStatus};

use docsync_repository::opensearch::{index_body, merge_settings};
use serde_json::Value;

use crate::document::Document;
use crate::errors::SyncError;
use crate::registry::DocumentRegistry;

/// Registered indices named in `names`, every registered index when empty.
///
/// # Returns
///
/// * `Err(SyncError::Configuration)` - If a name is not registered
pub fn select_indices(registry: &DocumentRegistry, names: &[String]) -> Result<Vec<String>, SyncError> {
    let known = registry.index_names();
    if names.is_empty() {
        return Ok(known);
    }

    let unknown: Vec<&str> = names
        .iter()
        .filter(|name| !known.contains(name))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(SyncError::configuration(format!(
            "unknown indices {:?}, choices are: {:?}",
            unknown, known
        )));
    }

    Ok(known.into_iter().filter(|name| names.contains(name)).collect())
}

/// Creation body of one of the document's indices: default settings merged
/// with the index settings, and the document mappings.
pub fn document_index_body(document: &dyn Document, index: &str, default_settings: &Value) -> Value {
    let definition = document.definition();
    let overrides = definition
        .index(index)
        .map(|spec| spec.settings.clone())
        .unwrap_or(Value::Null);
    index_body(
        &merge_settings(default_settings, &overrides),
        &definition.mappings(),
    )
}
