//! Keeps indices in step with record mutations.
//!
//! [`IndexSync`] writes a changed record to every document indexing its
//! model and re-serializes the records of documents that embed it. Signal
//! processors decide when that happens: immediately, or later through a task
//! queue.

mod signals;
mod task;

pub use signals::{
    DeferredProcessor, MutationEvent, MutationKind, RealTimeProcessor, RelationPhase,
    SignalProcessor,
};
pub use task::{
    ChannelTaskQueue, JsonTaskCodec, SyncTask, TaskCodec, TaskKind, TaskQueue, TaskWorker,
};

use std::sync::Arc;

use docsync_shared::{BulkAction, Record};
use tracing::{debug, instrument};

use crate::document::PrepareContext;
use crate::errors::SyncError;
use crate::pipeline::{BulkOptions, BulkPipeline, BulkReport};
use crate::registry::DocumentRegistry;

/// Applies record mutations to the indices.
pub struct IndexSync {
    registry: Arc<DocumentRegistry>,
    pipeline: Arc<BulkPipeline>,
    autosync: bool,
}

impl IndexSync {
    pub fn new(registry: Arc<DocumentRegistry>, pipeline: Arc<BulkPipeline>, autosync: bool) -> Self {
        Self {
            registry,
            pipeline,
            autosync,
        }
    }

    pub fn autosync(&self) -> bool {
        self.autosync
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Apply `action` to `record` in every document indexing its model,
    /// skipping documents that ignore signals.
    #[instrument(skip_all, fields(model = %record.model, pk = %record.pk, action = %action))]
    pub async fn update(
        &self,
        record: &Record,
        action: BulkAction,
    ) -> Result<Vec<BulkReport>, SyncError> {
        if !self.autosync {
            debug!("Autosync disabled, skipping");
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for document in self.registry.resolve(&record.model) {
            if document.definition().ignore_signals {
                continue;
            }
            let options = BulkOptions::new(action).ignore_errors(action == BulkAction::Delete);
            let report = self
                .pipeline
                .apply(document.as_ref(), vec![record.clone()], options)
                .await?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Remove `record` from every document indexing its model.
    ///
    /// Rejected deletions are reported, not raised.
    pub async fn delete(&self, record: &Record) -> Result<Vec<BulkReport>, SyncError> {
        self.update(record, BulkAction::Delete).await
    }

    /// Re-index the records of every document embedding `related`.
    pub async fn update_related(&self, related: &Record) -> Result<Vec<BulkReport>, SyncError> {
        self.refresh_related(related, PrepareContext::default(), false)
            .await
    }

    /// Re-index the records of every document embedding `related`, leaving
    /// `related` out since it is being deleted.
    pub async fn delete_related(&self, related: &Record) -> Result<Vec<BulkReport>, SyncError> {
        self.refresh_related(related, PrepareContext::ignoring(related.clone()), true)
            .await
    }

    #[instrument(skip_all, fields(model = %related.model, pk = %related.pk))]
    async fn refresh_related(
        &self,
        related: &Record,
        context: PrepareContext,
        ignore_errors: bool,
    ) -> Result<Vec<BulkReport>, SyncError> {
        if !self.autosync {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for document in self.registry.resolve_related(&related.model) {
            let records = match document.instances_from_related(related).await {
                Ok(Some(records)) if !records.is_empty() => records,
                Ok(_) | Err(SyncError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            debug!(
                document = %document.definition().name,
                count = records.len(),
                "Re-indexing related records"
            );
            let options = BulkOptions::new(BulkAction::Index)
                .with_context(context.clone())
                .ignore_errors(ignore_errors);
            let report = self
                .pipeline
                .apply(document.as_ref(), records, options)
                .await?;
            reports.push(report);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentDefinition, FieldSpec, IndexSpec, ModelDocument};
    use crate::pipeline::PipelineConfig;
    use crate::source::MemorySource;
    use crate::testing::{connections, country_definition, MockBackend};
    use serde_json::json;

    pub(crate) fn europe() -> Record {
        Record::new("Continent", 1).with_attribute("name", "Europe")
    }

    pub(crate) fn france() -> Record {
        Record::new("Country", 1)
            .with_attribute("name", "France")
            .with_attribute("population", 68)
            .with_one("continent", europe())
    }

    pub(crate) fn setup(backend: Arc<MockBackend>, autosync: bool) -> IndexSync {
        setup_with(backend, autosync, vec![france()])
    }

    /// Countries embedding their continent, and continents on their own.
    fn setup_with(backend: Arc<MockBackend>, autosync: bool, countries: Vec<Record>) -> IndexSync {
        let country_doc = DocumentDefinition::new("CountryDocument", "Country")
            .with_index(IndexSpec::new("country"))
            .with_field(FieldSpec::new("name", "text"))
            .with_field(FieldSpec::new("continent", "keyword").with_attr("continent.name"))
            .with_related("Continent", Some("continent"));
        let continents = DocumentDefinition::new("ContinentDocument", "Continent")
            .with_index(IndexSpec::new("continent"))
            .with_field(FieldSpec::new("name", "text"));

        let mut registry = DocumentRegistry::new();
        registry
            .register(Arc::new(ModelDocument::new(
                country_doc,
                Arc::new(MemorySource::new("Country", countries)),
            )))
            .unwrap();
        registry
            .register(Arc::new(ModelDocument::new(
                continents,
                Arc::new(MemorySource::new("Continent", vec![europe()])),
            )))
            .unwrap();

        let pipeline = BulkPipeline::new(connections(backend), PipelineConfig::default());
        IndexSync::new(Arc::new(registry), Arc::new(pipeline), autosync)
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let backend = MockBackend::new();
        let sync = setup(backend.clone(), true);

        let reports = sync.update(&france(), BulkAction::Index).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            backend.document("country", "1").unwrap(),
            json!({"name": "France", "continent": "Europe"})
        );

        sync.delete(&france()).await.unwrap();
        assert!(backend.document("country", "1").is_none());
    }

    #[tokio::test]
    async fn test_delete_of_missing_document_succeeds() {
        let backend = MockBackend::new();
        let sync = setup(backend.clone(), true);

        let reports = sync.delete(&france()).await.unwrap();
        assert_eq!(reports[0].succeeded, 1);
    }

    #[tokio::test]
    async fn test_autosync_disabled() {
        let backend = MockBackend::new();
        let sync = setup(backend.clone(), false);

        assert!(sync.update(&france(), BulkAction::Index).await.unwrap().is_empty());
        assert!(sync.update_related(&europe()).await.unwrap().is_empty());
        assert!(backend.bulk_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_ignore_signals() {
        let backend = MockBackend::new();
        let mut registry = DocumentRegistry::new();
        registry
            .register(Arc::new(ModelDocument::new(
                country_definition().ignoring_signals(),
                Arc::new(MemorySource::new("Country", Vec::new())),
            )))
            .unwrap();
        let pipeline = BulkPipeline::new(connections(backend.clone()), PipelineConfig::default());
        let sync = IndexSync::new(Arc::new(registry), Arc::new(pipeline), true);

        assert!(sync.update(&france(), BulkAction::Index).await.unwrap().is_empty());
        assert!(backend.bulk_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_model_is_ignored() {
        let backend = MockBackend::new();
        let sync = setup(backend.clone(), true);

        let language = Record::new("Language", 1).with_attribute("name", "French");
        assert!(sync.update(&language, BulkAction::Index).await.unwrap().is_empty());
        assert!(sync.update_related(&language).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_related_reindexes_roots() {
        let backend = MockBackend::new();
        let sync = setup(backend.clone(), true);

        let reports = sync.update_related(&europe()).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].document, "CountryDocument");
        assert_eq!(
            backend.document("country", "1").unwrap()["continent"],
            json!("Europe")
        );
    }

    #[tokio::test]
    async fn test_related_fan_out_reaches_exactly_the_affected_roots() {
        let backend = MockBackend::new();
        let asia = Record::new("Continent", 2).with_attribute("name", "Asia");
        let spain = Record::new("Country", 2)
            .with_attribute("name", "Spain")
            .with_one("continent", europe());
        let japan = Record::new("Country", 3)
            .with_attribute("name", "Japan")
            .with_one("continent", asia);
        let sync = setup_with(backend.clone(), true, vec![japan, spain, france()]);

        let reports = sync.update_related(&europe()).await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].succeeded, 2);
        assert_eq!(backend.ids("country"), vec!["1", "2"]);
        let written: Vec<String> = backend.snapshot().bulk_calls[0]
            .iter()
            .map(|operation| operation.id.clone())
            .collect();
        assert_eq!(written, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_delete_related_leaves_deleted_record_out() {
        let backend = MockBackend::new();
        let sync = setup(backend.clone(), true);

        sync.delete_related(&europe()).await.unwrap();
        assert_eq!(
            backend.document("country", "1").unwrap(),
            json!({"name": "France", "continent": null})
        );
    }
}
