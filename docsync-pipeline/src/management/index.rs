//! Index lifecycle commands.

use std::sync::Arc;

use docsync_repository::{Connections, SearchBackend, SearchError};
use docsync_shared::{CommandAction, ModelName};
use serde_json::Value;
use tracing::{error, info, instrument};

use super::{document_index_body, select_indices};
use crate::document::Document;
use crate::errors::SyncError;
use crate::indices::{version_name, IndexVersions};
use crate::registry::DocumentRegistry;

/// An index command as requested.
#[derive(Debug, Clone)]
pub struct IndexCommand {
    /// `Create`, `Delete`, `Rebuild` or `Update`.
    pub action: CommandAction,
    /// Indices to act on; every registered index when empty.
    pub indices: Vec<String>,
    /// Act on the version `NAME--SUFFIX` instead of `NAME`.
    pub suffix: Option<String>,
    /// Keep going after a failed index.
    pub ignore_error: bool,
}

impl IndexCommand {
    pub fn new(action: CommandAction) -> Self {
        Self {
            action,
            indices: Vec::new(),
            suffix: None,
            ignore_error: false,
        }
    }
}

/// Result of an index command on one index.
#[derive(Debug)]
pub struct IndexOutcome {
    pub index: String,
    /// The physical index acted on.
    pub target: String,
    pub error: Option<SyncError>,
}

/// State of a registered index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStatus {
    pub index: String,
    pub document: String,
    pub model: ModelName,
    pub exists: bool,
    pub count: Option<u64>,
    pub active_version: Option<String>,
}

/// Runs index lifecycle commands.
pub struct IndexManager {
    registry: Arc<DocumentRegistry>,
    connections: Connections,
    default_settings: Value,
}

impl IndexManager {
    pub fn new(registry: Arc<DocumentRegistry>, connections: Connections, default_settings: Value) -> Self {
        Self {
            registry,
            connections,
            default_settings,
        }
    }

    /// Indices a command acts on.
    pub fn select(&self, names: &[String]) -> Result<Vec<String>, SyncError> {
        select_indices(&self.registry, names)
    }

    fn resolve(&self, index: &str) -> Result<(Arc<dyn Document>, Arc<dyn SearchBackend>), SyncError> {
        let document = self
            .registry
            .document_for_index(index)
            .ok_or_else(|| SyncError::configuration(format!("unknown index '{}'", index)))?;
        let backend = self
            .connections
            .get(document.definition().connection.as_deref())?;
        Ok((document, backend))
    }

    /// Run the command on every selected index.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<IndexOutcome>)` - One outcome per index; failures only
    ///   appear here when `ignore_error` is set
    /// * `Err(SyncError)` - The first failure otherwise
    #[instrument(skip_all, fields(action = %command.action))]
    pub async fn execute(&self, command: &IndexCommand) -> Result<Vec<IndexOutcome>, SyncError> {
        if !matches!(
            command.action,
            CommandAction::Create | CommandAction::Delete | CommandAction::Rebuild | CommandAction::Update
        ) {
            return Err(SyncError::configuration(format!(
                "invalid index action '{}', valid actions are: create, delete, rebuild, update",
                command.action
            )));
        }

        let mut outcomes = Vec::new();
        for index in self.select(&command.indices)? {
            let target = match command.suffix.as_deref() {
                Some(suffix) if !suffix.is_empty() => version_name(&index, suffix),
                _ => index.clone(),
            };

            match self.apply(command.action, &index, &target).await {
                Ok(()) => {
                    info!(index = %target, "Index {}", command.action.past());
                    outcomes.push(IndexOutcome {
                        index,
                        target,
                        error: None,
                    });
                }
                Err(err) => {
                    error!(index = %target, error = %err, "Index command failed");
                    if !command.ignore_error {
                        return Err(err);
                    }
                    outcomes.push(IndexOutcome {
                        index,
                        target,
                        error: Some(err),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    async fn apply(&self, action: CommandAction, index: &str, target: &str) -> Result<(), SyncError> {
        let (document, backend) = self.resolve(index)?;

        match action {
            CommandAction::Create => self.create(document.as_ref(), &backend, index, target).await,
            CommandAction::Delete => Ok(backend.delete_index(target).await?),
            CommandAction::Update => {
                let mappings = document.definition().mappings();
                Ok(backend.put_mapping(target, &mappings).await?)
            }
            CommandAction::Rebuild => {
                match backend.delete_index(target).await {
                    Ok(()) | Err(SearchError::IndexNotFound(_)) => {}
                    Err(err) => return Err(err.into()),
                }
                self.create(document.as_ref(), &backend, index, target).await
            }
            other => Err(SyncError::configuration(format!(
                "invalid index action '{}'",
                other
            ))),
        }
    }

    /// Create `target`; a version becomes active when `index` has no active
    /// version yet.
    async fn create(
        &self,
        document: &dyn Document,
        backend: &Arc<dyn SearchBackend>,
        index: &str,
        target: &str,
    ) -> Result<(), SyncError> {
        let body = document_index_body(document, index, &self.default_settings);
        backend.create_index(target, &body).await?;

        if target != index {
            let versions = IndexVersions::new(backend.clone());
            if versions.active_version(index).await?.is_none() {
                versions.activate_version(index, target).await?;
            }
        }
        Ok(())
    }

    /// Every registered index with its state.
    #[instrument(skip_all)]
    pub async fn list(&self) -> Result<Vec<IndexStatus>, SyncError> {
        let mut statuses = Vec::new();
        for index in self.registry.index_names() {
            let (document, backend) = self.resolve(&index)?;
            let exists = backend.index_exists(&index).await?;
            let (count, active_version) = if exists {
                let versions = IndexVersions::new(backend.clone());
                (
                    Some(backend.count(&index).await?),
                    versions.active_version(&index).await?,
                )
            } else {
                (None, None)
            };

            statuses.push(IndexStatus {
                index,
                document: document.definition().name.clone(),
                model: document.definition().model.clone(),
                exists,
                count,
                active_version,
            });
        }
        Ok(statuses)
    }
}
