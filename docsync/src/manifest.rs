//! Document manifest.
//!
//! The manifest is a JSON list of document definitions, each with the path
//! of a JSON file holding the records of its model. Relative record paths
//! are resolved against the manifest's directory.
//!
//! ```json
//! [
//!   {
//!     "document": {
//!       "name": "CountryDocument",
//!       "model": "Country",
//!       "indices": [{"name": "country"}],
//!       "fields": [{"name": "name", "type": "text"}]
//!     },
//!     "records": "countries.json"
//!   }
//! ]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docsync_pipeline::{DocumentDefinition, DocumentRegistry, MemorySource, ModelDocument};
use docsync_shared::Record;
use serde::Deserialize;
use tracing::{debug, info};

use crate::DocsyncError;

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub document: DocumentDefinition,
    pub records: PathBuf,
}

/// Parse a manifest.
pub fn parse(raw: &str) -> Result<Vec<ManifestEntry>, DocsyncError> {
    serde_json::from_str(raw).map_err(|e| DocsyncError::manifest(format!("invalid manifest: {}", e)))
}

/// Load the records of one entry.
pub fn load_records(entry: &ManifestEntry, base: &Path) -> Result<Vec<Record>, DocsyncError> {
    let path = base.join(&entry.records);
    let raw = fs::read_to_string(&path).map_err(|e| {
        DocsyncError::manifest(format!("cannot read records file {}: {}", path.display(), e))
    })?;
    let records: Vec<Record> = serde_json::from_str(&raw).map_err(|e| {
        DocsyncError::manifest(format!("invalid records file {}: {}", path.display(), e))
    })?;

    let model = &entry.document.model;
    if let Some(stray) = records.iter().find(|record| &record.model != model) {
        return Err(DocsyncError::manifest(format!(
            "records file {} holds a {} record (pk {}), expected {}",
            path.display(),
            stray.model,
            stray.pk,
            model
        )));
    }
    Ok(records)
}

/// Load a manifest file into a registry of in-memory documents.
pub fn load(path: &Path) -> Result<DocumentRegistry, DocsyncError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| DocsyncError::manifest(format!("cannot read {}: {}", path.display(), e)))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut registry = DocumentRegistry::new();
    for entry in parse(&raw)? {
        let records = load_records(&entry, base)?;
        debug!(
            document = %entry.document.name,
            count = records.len(),
            "Loaded records"
        );
        let source = Arc::new(MemorySource::new(entry.document.model.clone(), records));
        registry.register(Arc::new(ModelDocument::new(entry.document, source)))?;
    }

    info!(
        manifest = %path.display(),
        documents = registry.len(),
        "Loaded document manifest"
    );
    Ok(registry)
}
