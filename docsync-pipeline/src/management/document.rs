//! Bulk document commands.
//!
//! A command is first planned: indices and models are resolved, filters are
//! parsed and the expected number of records is counted. The plan is then
//! executed index by index through the bulk pipeline. Rejected documents
//! never stop a command; they are collected in the reports.

use std::sync::Arc;

use docsync_shared::{BulkAction, CommandAction, Lookup, ModelName, PrimaryKey};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use super::{document_index_body, select_indices};
use crate::document::Document;
use crate::errors::SyncError;
use crate::indices::{default_suffix, version_name, IndexVersions};
use crate::paginator::BatchType;
use crate::pipeline::{BulkOptions, BulkPipeline, BulkReport, ProgressSink};
use crate::registry::DocumentRegistry;
use crate::source::RecordQuery;

/// A document command as requested.
#[derive(Debug, Clone)]
pub struct DocumentCommand {
    /// `Index`, `Delete`, `Update` or `Migrate`.
    pub action: CommandAction,
    /// `key=value` lookups records must match.
    pub filters: Vec<String>,
    /// `key=value` lookups records must not match.
    pub excludes: Vec<String>,
    pub indices: Vec<String>,
    /// Model names; only their indices are used when set.
    pub objects: Vec<String>,
    /// Act on at most this many records per index.
    pub count: Option<usize>,
    /// Overrides the process default when set.
    pub parallel: Option<bool>,
    pub refresh: Option<bool>,
    /// Skip records whose id is already in the index. Index action only.
    pub missing: bool,
    /// Write to the version `NAME--SUFFIX` of each index.
    pub index_suffix: Option<String>,
    pub batch_size: Option<usize>,
    pub batch_type: BatchType,
    pub ignore_error: bool,
}

impl DocumentCommand {
    pub fn new(action: CommandAction) -> Self {
        Self {
            action,
            filters: Vec::new(),
            excludes: Vec::new(),
            indices: Vec::new(),
            objects: Vec::new(),
            count: None,
            parallel: None,
            refresh: None,
            missing: false,
            index_suffix: None,
            batch_size: None,
            batch_type: BatchType::default(),
            ignore_error: false,
        }
    }

    fn bulk_action(&self) -> Result<BulkAction, SyncError> {
        match self.action {
            CommandAction::Index
            | CommandAction::Delete
            | CommandAction::Update
            | CommandAction::Migrate => self.action.bulk_action().ok_or_else(|| {
                SyncError::configuration(format!("no bulk action for '{}'", self.action))
            }),
            other => Err(SyncError::configuration(format!(
                "invalid document action '{}', valid actions are: index, delete, update, migrate",
                other
            ))),
        }
    }
}

/// One index of a planned command.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub index: String,
    /// The physical index written to.
    pub target: String,
    pub document: String,
    pub model: ModelName,
    pub query: RecordQuery,
    /// Records the query yields.
    pub expected: usize,
}

#[derive(Debug, Clone)]
pub struct DocumentPlan {
    pub action: CommandAction,
    pub entries: Vec<PlanEntry>,
}

impl DocumentPlan {
    pub fn expected(&self) -> usize {
        self.entries.iter().map(|entry| entry.expected).sum()
    }
}

/// Result of a command on one index.
#[derive(Debug)]
pub struct EntryResult {
    pub index: String,
    pub target: String,
    pub model: ModelName,
    pub report: BulkReport,
    /// Set when the run aborted; `report` is empty then.
    pub error: Option<SyncError>,
}

/// Plans and runs document commands.
pub struct DocumentManager {
    registry: Arc<DocumentRegistry>,
    pipeline: Arc<BulkPipeline>,
    default_settings: Value,
}

impl DocumentManager {
    pub fn new(registry: Arc<DocumentRegistry>, pipeline: Arc<BulkPipeline>, default_settings: Value) -> Self {
        Self {
            registry,
            pipeline,
            default_settings,
        }
    }

    fn document(&self, index: &str) -> Result<Arc<dyn Document>, SyncError> {
        self.registry
            .document_for_index(index)
            .ok_or_else(|| SyncError::configuration(format!("unknown index '{}'", index)))
    }

    fn select(&self, command: &DocumentCommand) -> Result<Vec<String>, SyncError> {
        let mut indices = select_indices(&self.registry, &command.indices)?;
        if command.objects.is_empty() {
            return Ok(indices);
        }

        let models = self.registry.models();
        for object in &command.objects {
            if !models.iter().any(|model| model.matches(object)) {
                let choices: Vec<&str> = models.iter().map(ModelName::as_str).collect();
                return Err(SyncError::configuration(format!(
                    "unknown object '{}', choices are: {:?}",
                    object, choices
                )));
            }
        }

        let mut kept = Vec::new();
        for index in indices.drain(..) {
            let model = self.document(&index)?.definition().model.clone();
            if command.objects.iter().any(|object| model.matches(object)) {
                kept.push(index);
            }
        }
        Ok(kept)
    }

    fn base_query(command: &DocumentCommand) -> Result<RecordQuery, SyncError> {
        let mut query = RecordQuery::new().limit(command.count);
        for filter in &command.filters {
            query = query.filter(filter.parse::<Lookup>()?);
        }
        for exclude in &command.excludes {
            query = query.exclude(exclude.parse::<Lookup>()?);
        }
        Ok(query)
    }

    /// Resolve the command against the registry and the backend.
    ///
    /// # Returns
    ///
    /// * `Ok(DocumentPlan)` - One entry per selected index
    /// * `Err(SyncError::Configuration)` - If the action, an index or an
    ///   object is invalid
    /// * `Err(SyncError::LookupMismatch)` - If a filter is malformed or names
    ///   an unknown field
    /// * `Err(SyncError::NotFound)` - If target indices are not created
    #[instrument(skip_all, fields(action = %command.action))]
    pub async fn plan(&self, command: &DocumentCommand) -> Result<DocumentPlan, SyncError> {
        command.bulk_action()?;
        let base = Self::base_query(command)?;
        let migrating = command.action == CommandAction::Migrate;
        let migration_suffix = match command.index_suffix.as_deref() {
            Some(suffix) if !suffix.is_empty() => suffix.to_string(),
            _ => default_suffix(),
        };

        let mut entries = Vec::new();
        let mut missing_indices = Vec::new();
        for index in self.select(command)? {
            let document = self.document(&index)?;
            let definition = document.definition();
            let backend = self.pipeline.backend_for(document.as_ref())?;

            let target = if migrating {
                version_name(&index, &migration_suffix)
            } else {
                match command.index_suffix.as_deref() {
                    Some(suffix) if !suffix.is_empty() => version_name(&index, suffix),
                    _ => index.clone(),
                }
            };

            if !migrating && !backend.index_exists(&target).await? {
                missing_indices.push(target);
                continue;
            }

            let mut query = base.clone();
            if command.missing && command.action == CommandAction::Index {
                let present = backend.document_ids(&target).await?;
                info!(index = %target, count = present.len(), "Skipping documents already indexed");
                query = query.excluding_pks(present.iter().map(|id| PrimaryKey::parse(id)));
            }

            let expected = document
                .source()
                .count(&document.query(query.clone()))
                .await
                .map_err(|err| match err {
                    SyncError::LookupMismatch(reason) => SyncError::lookup(format!(
                        "{} (model {}, index '{}')",
                        reason, definition.model, index
                    )),
                    other => other,
                })?;

            entries.push(PlanEntry {
                index,
                target,
                document: definition.name.clone(),
                model: definition.model.clone(),
                query,
                expected,
            });
        }

        if !missing_indices.is_empty() {
            return Err(SyncError::not_found(format!(
                "the following indices are not created: {:?}",
                missing_indices
            )));
        }

        Ok(DocumentPlan {
            action: command.action,
            entries,
        })
    }

    /// Run a planned command.
    ///
    /// A migration creates each new version, indexes into it and activates
    /// it, unless documents were rejected and errors are not ignored.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<EntryResult>)` - One result per plan entry
    /// * `Err(SyncError)` - The first aborted run, unless `ignore_error` is set
    #[instrument(skip_all, fields(action = %plan.action, entries = plan.entries.len()))]
    pub async fn execute(
        &self,
        command: &DocumentCommand,
        plan: &DocumentPlan,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Vec<EntryResult>, SyncError> {
        let action = command.bulk_action()?;
        let mut results = Vec::new();

        for entry in &plan.entries {
            let document = self.document(&entry.index)?;
            let mut options = BulkOptions::new(action)
                .with_query(entry.query.clone())
                .with_chunk_size(command.batch_size)
                .with_batch_type(command.batch_type)
                .ignore_errors(true)
                .into_indices(vec![entry.target.clone()]);
            if let Some(parallel) = command.parallel {
                options = options.parallel(parallel);
            }
            if let Some(refresh) = command.refresh {
                options = options.refresh(refresh);
            }
            if let Some(sink) = &progress {
                options = options.with_progress(sink.clone());
            }

            let outcome = match plan.action {
                CommandAction::Migrate => {
                    self.migrate(document.as_ref(), entry, options, command.ignore_error)
                        .await
                }
                _ => self.pipeline.run(document.as_ref(), options).await,
            };

            match outcome {
                Ok(report) => results.push(EntryResult {
                    index: entry.index.clone(),
                    target: entry.target.clone(),
                    model: entry.model.clone(),
                    report,
                    error: None,
                }),
                Err(err) => {
                    error!(index = %entry.target, error = %err, "Document command failed");
                    if !command.ignore_error {
                        return Err(err);
                    }
                    results.push(EntryResult {
                        index: entry.index.clone(),
                        target: entry.target.clone(),
                        model: entry.model.clone(),
                        report: BulkReport::new(entry.document.clone(), action),
                        error: Some(err),
                    });
                }
            }
        }
        Ok(results)
    }

    async fn migrate(
        &self,
        document: &dyn Document,
        entry: &PlanEntry,
        options: BulkOptions,
        ignore_error: bool,
    ) -> Result<BulkReport, SyncError> {
        let backend = self.pipeline.backend_for(document)?;
        let body = document_index_body(document, &entry.index, &self.default_settings);
        backend.create_index(&entry.target, &body).await?;
        info!(index = %entry.index, version = %entry.target, "Created index version");

        let report = self.pipeline.run(document, options).await?;
        if report.failures.is_empty() || ignore_error {
            IndexVersions::new(backend)
                .activate_version(&entry.index, &entry.target)
                .await?;
        } else {
            warn!(
                index = %entry.index,
                version = %entry.target,
                failed = report.failed(),
                "Documents were rejected, new version left inactive"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineConfig, RetryPolicy};
    use crate::testing::{connections, countries, country_document, MockBackend};
    use docsync_repository::SearchBackend;
    use serde_json::json;

    fn manager(backend: Arc<MockBackend>, count: i64) -> DocumentManager {
        let mut registry = DocumentRegistry::new();
        registry
            .register(Arc::new(country_document(countries(count))))
            .unwrap();
        let pipeline = BulkPipeline::new(
            connections(backend),
            PipelineConfig {
                retry: RetryPolicy::none(),
                ..PipelineConfig::default()
            },
        );
        DocumentManager::new(Arc::new(registry), Arc::new(pipeline), json!({}))
    }

    #[tokio::test]
    async fn test_index_all() {
        let backend = MockBackend::new().with_index("country");
        let manager = manager(backend.clone(), 10);
        let command = DocumentCommand::new(CommandAction::Index);

        let plan = manager.plan(&command).await.unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.expected(), 10);

        let results = manager.execute(&command, &plan, None).await.unwrap();
        assert_eq!(results[0].report.succeeded, 10);
        assert_eq!(backend.ids("country").len(), 10);
    }

    #[tokio::test]
    async fn test_plan_requires_created_indices() {
        let backend = MockBackend::new();
        let manager = manager(backend, 3);

        let err = manager
            .plan(&DocumentCommand::new(CommandAction::Index))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert!(err.to_string().contains("country"));
    }

    #[tokio::test]
    async fn test_plan_rejects_unknown_names() {
        let backend = MockBackend::new().with_index("country");
        let manager = manager(backend, 3);

        let mut command = DocumentCommand::new(CommandAction::Index);
        command.objects = vec!["Language".into()];
        let err = manager.plan(&command).await.unwrap_err();
        assert!(err.to_string().contains("unknown object 'Language'"));

        let mut command = DocumentCommand::new(CommandAction::Rebuild);
        command.objects = vec!["country".into()];
        assert!(matches!(
            manager.plan(&command).await,
            Err(SyncError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_filters_excludes_and_count() {
        let backend = MockBackend::new().with_index("country");
        let manager = manager(backend.clone(), 10);

        let mut command = DocumentCommand::new(CommandAction::Index);
        command.filters = vec!["population__gte=30".into()];
        command.excludes = vec!["pk__in=4,5".into()];
        command.count = Some(3);

        let plan = manager.plan(&command).await.unwrap();
        assert_eq!(plan.expected(), 3);
        manager.execute(&command, &plan, None).await.unwrap();
        assert_eq!(backend.ids("country"), vec!["3", "6", "7"]);
    }

    #[tokio::test]
    async fn test_unknown_filter_field() {
        let backend = MockBackend::new().with_index("country");
        let manager = manager(backend, 3);

        let mut command = DocumentCommand::new(CommandAction::Index);
        command.filters = vec!["capital=Paris".into()];
        let err = manager.plan(&command).await.unwrap_err();
        assert!(matches!(err, SyncError::LookupMismatch(_)));
        assert!(err.to_string().contains("index 'country'"));

        command.filters = vec!["capital".into()];
        let err = manager.plan(&command).await.unwrap_err();
        assert!(err.to_string().contains("invalid filter"));
    }

    #[tokio::test]
    async fn test_missing_skips_indexed_records() {
        let backend = MockBackend::new().with_index("country");
        let manager = manager(backend.clone(), 5);
        backend
            .bulk(
                &[docsync_repository::BulkOperation {
                    action: BulkAction::Index,
                    index: "country".into(),
                    id: "2".into(),
                    source: Some(json!({"name": "stale"})),
                }],
                false,
            )
            .await
            .unwrap();

        let mut command = DocumentCommand::new(CommandAction::Index);
        command.missing = true;
        let plan = manager.plan(&command).await.unwrap();
        assert_eq!(plan.expected(), 4);

        manager.execute(&command, &plan, None).await.unwrap();
        assert_eq!(backend.ids("country").len(), 5);
        assert_eq!(
            backend.document("country", "2").unwrap(),
            json!({"name": "stale"})
        );
    }

    #[tokio::test]
    async fn test_rejections_are_reported() {
        let backend = MockBackend::new().with_index("country");
        backend.reject("3", 400, "mapper_parsing_exception");
        let manager = manager(backend, 5);
        let command = DocumentCommand::new(CommandAction::Index);

        let plan = manager.plan(&command).await.unwrap();
        let results = manager.execute(&command, &plan, None).await.unwrap();
        let report = &results[0].report;
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].id, "3");
    }

    #[tokio::test]
    async fn test_backend_down_aborts_unless_ignored() {
        let backend = MockBackend::new().with_index("country");
        let manager = manager(backend.clone(), 5);
        let mut command = DocumentCommand::new(CommandAction::Index);
        let plan = manager.plan(&command).await.unwrap();

        backend.set_unavailable(true);
        let err = manager.execute(&command, &plan, None).await.unwrap_err();
        assert!(matches!(err, SyncError::BackendUnavailable(_)));

        command.ignore_error = true;
        let results = manager.execute(&command, &plan, None).await.unwrap();
        assert!(results[0].error.is_some());
    }

    #[tokio::test]
    async fn test_index_suffix_targets_version() {
        let backend = MockBackend::new().with_index("country--v2");
        let manager = manager(backend.clone(), 3);

        let mut command = DocumentCommand::new(CommandAction::Index);
        command.index_suffix = Some("v2".into());
        let plan = manager.plan(&command).await.unwrap();
        assert_eq!(plan.entries[0].target, "country--v2");

        manager.execute(&command, &plan, None).await.unwrap();
        assert_eq!(backend.ids("country--v2").len(), 3);
    }

    #[tokio::test]
    async fn test_migrate_switches_alias() {
        let backend = MockBackend::new().with_index("country");
        let manager = manager(backend.clone(), 4);

        let mut command = DocumentCommand::new(CommandAction::Migrate);
        command.index_suffix = Some("v1".into());
        let plan = manager.plan(&command).await.unwrap();
        assert_eq!(plan.entries[0].target, "country--v1");

        manager.execute(&command, &plan, None).await.unwrap();

        let versions = IndexVersions::new(backend.clone());
        assert_eq!(
            versions.active_version("country").await.unwrap().as_deref(),
            Some("country--v1")
        );
        assert_eq!(backend.ids("country").len(), 4);
        assert_eq!(
            backend.snapshot().bodies["country--v1"]["mappings"]["properties"]["name"]["type"],
            "text"
        );
    }

    #[tokio::test]
    async fn test_migrate_keeps_old_version_on_rejections() {
        let backend = MockBackend::new();
        let manager = manager(backend.clone(), 4);
        backend.reject("2", 400, "mapper_parsing_exception");

        let mut first = DocumentCommand::new(CommandAction::Migrate);
        first.index_suffix = Some("v1".into());
        first.ignore_error = true;
        let plan = manager.plan(&first).await.unwrap();
        manager.execute(&first, &plan, None).await.unwrap();

        let mut second = DocumentCommand::new(CommandAction::Migrate);
        second.index_suffix = Some("v2".into());
        let plan = manager.plan(&second).await.unwrap();
        let results = manager.execute(&second, &plan, None).await.unwrap();
        assert_eq!(results[0].report.failed(), 1);

        let versions = IndexVersions::new(backend);
        assert_eq!(
            versions.active_version("country").await.unwrap().as_deref(),
            Some("country--v1")
        );
    }
}
