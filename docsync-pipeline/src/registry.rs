//! Registry of documents.
//!
//! Built once at startup, then shared read-only by the pipeline, the sync
//! handlers and the management commands.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use docsync_shared::ModelName;
use tracing::debug;

use crate::document::Document;
use crate::errors::SyncError;

/// Maps models to the documents indexing them.
#[derive(Default, Clone)]
pub struct DocumentRegistry {
    documents: Vec<Arc<dyn Document>>,
    indices: BTreeMap<String, usize>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document.
    ///
    /// # Returns
    ///
    /// * `Err(SyncError::Configuration)` - If the definition is invalid, its
    ///   source yields another model, or one of its indices is already bound
    ///   to a registered document
    pub fn register(&mut self, document: Arc<dyn Document>) -> Result<(), SyncError> {
        let definition = document.definition();
        definition.validate()?;

        if document.source().model() != &definition.model {
            return Err(SyncError::configuration(format!(
                "document '{}' indexes {} but its source yields {}",
                definition.name,
                definition.model,
                document.source().model()
            )));
        }

        for index in &definition.indices {
            if let Some(&existing) = self.indices.get(&index.name) {
                return Err(SyncError::configuration(format!(
                    "index '{}' is already bound to document '{}'",
                    index.name,
                    self.documents[existing].definition().name
                )));
            }
        }

        let position = self.documents.len();
        for index in &definition.indices {
            self.indices.insert(index.name.clone(), position);
        }
        debug!(
            document = %definition.name,
            model = %definition.model,
            indices = ?definition.index_names(),
            "Registered document"
        );
        self.documents.push(document);
        Ok(())
    }

    /// Documents indexing `model`, in registration order.
    pub fn resolve(&self, model: &ModelName) -> Vec<Arc<dyn Document>> {
        self.documents
            .iter()
            .filter(|document| &document.definition().model == model)
            .cloned()
            .collect()
    }

    /// Documents declaring `model` as a related model.
    pub fn resolve_related(&self, model: &ModelName) -> Vec<Arc<dyn Document>> {
        self.documents
            .iter()
            .filter(|document| document.definition().is_related_to(model))
            .cloned()
            .collect()
    }

    pub fn list_all(&self) -> &[Arc<dyn Document>] {
        &self.documents
    }

    /// Every registered index name, sorted.
    pub fn index_names(&self) -> Vec<String> {
        self.indices.keys().cloned().collect()
    }

    pub fn document_for_index(&self, index: &str) -> Option<Arc<dyn Document>> {
        self.indices
            .get(index)
            .map(|&position| self.documents[position].clone())
    }

    pub fn models(&self) -> BTreeSet<ModelName> {
        self.documents
            .iter()
            .map(|document| document.definition().model.clone())
            .collect()
    }

    /// Whether any document indexes `model` or declares it as related.
    pub fn contains(&self, model: &ModelName) -> bool {
        self.documents.iter().any(|document| {
            let definition = document.definition();
            &definition.model == model || definition.is_related_to(model)
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
