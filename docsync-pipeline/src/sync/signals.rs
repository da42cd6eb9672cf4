//! Mutation events and the processors reacting to them.

use std::sync::Arc;

use async_trait::async_trait;
use docsync_shared::{BulkAction, Record};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::task::{SyncTask, TaskCodec, TaskKind, TaskQueue};
use super::IndexSync;
use crate::errors::SyncError;

/// Phase of a many-to-many relation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationPhase {
    PreAdd,
    PostAdd,
    PreRemove,
    PostRemove,
    PreClear,
    PostClear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// The record was created or updated.
    Saved,
    /// The record is about to be deleted.
    Deleting,
    RelationsChanged(RelationPhase),
}

/// A change to a record, raised by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub kind: MutationKind,
    pub record: Record,
}

impl MutationEvent {
    pub fn saved(record: Record) -> Self {
        Self {
            kind: MutationKind::Saved,
            record,
        }
    }

    pub fn deleting(record: Record) -> Self {
        Self {
            kind: MutationKind::Deleting,
            record,
        }
    }

    pub fn relations_changed(record: Record, phase: RelationPhase) -> Self {
        Self {
            kind: MutationKind::RelationsChanged(phase),
            record,
        }
    }

    /// What the event asks for: re-index, delete, or nothing.
    pub fn task_kind(&self) -> Option<TaskKind> {
        match self.kind {
            MutationKind::Saved => Some(TaskKind::Save),
            MutationKind::Deleting => Some(TaskKind::Delete),
            MutationKind::RelationsChanged(phase) => match phase {
                RelationPhase::PostAdd | RelationPhase::PostRemove | RelationPhase::PostClear => {
                    Some(TaskKind::Save)
                }
                RelationPhase::PreRemove | RelationPhase::PreClear => Some(TaskKind::Delete),
                RelationPhase::PreAdd => None,
            },
        }
    }
}

/// Reacts to mutation events.
#[async_trait]
pub trait SignalProcessor: Send + Sync {
    async fn handle(&self, event: MutationEvent) -> Result<(), SyncError>;
}

/// Run a sync task right away.
///
/// Records of models no document tracks are skipped.
pub(crate) async fn execute(sync: &IndexSync, kind: TaskKind, record: &Record) -> Result<(), SyncError> {
    if !sync.registry().contains(&record.model) {
        debug!(model = %record.model, "Model not registered, skipping");
        return Ok(());
    }
    match kind {
        TaskKind::Save => {
            sync.update(record, BulkAction::Index).await?;
            sync.update_related(record).await?;
        }
        TaskKind::Delete => {
            sync.delete(record).await?;
            sync.delete_related(record).await?;
        }
    }
    Ok(())
}

/// Syncs every event before `handle` returns.
pub struct RealTimeProcessor {
    sync: Arc<IndexSync>,
}

impl RealTimeProcessor {
    pub fn new(sync: Arc<IndexSync>) -> Self {
        Self { sync }
    }
}

#[async_trait]
impl SignalProcessor for RealTimeProcessor {
    async fn handle(&self, event: MutationEvent) -> Result<(), SyncError> {
        let Some(kind) = event.task_kind() else {
            return Ok(());
        };
        execute(&self.sync, kind, &event.record).await
    }
}

/// Hands every event to a task queue; a [`TaskWorker`](super::TaskWorker)
/// applies it later.
pub struct DeferredProcessor {
    queue: Arc<dyn TaskQueue>,
    codec: Arc<dyn TaskCodec>,
    autosync: bool,
}

impl DeferredProcessor {
    pub fn new(queue: Arc<dyn TaskQueue>, codec: Arc<dyn TaskCodec>, autosync: bool) -> Self {
        Self {
            queue,
            codec,
            autosync,
        }
    }
}

#[async_trait]
impl SignalProcessor for DeferredProcessor {
    async fn handle(&self, event: MutationEvent) -> Result<(), SyncError> {
        if !self.autosync {
            debug!("Autosync disabled, not enqueuing");
            return Ok(());
        }
        let Some(kind) = event.task_kind() else {
            return Ok(());
        };

        let task = SyncTask::new(kind, event.record);
        let payload = self.codec.encode(&task)?;
        self.queue.submit(payload).await.inspect_err(|err| {
            warn!(task_id = %task.id, error = %err, "Failed to enqueue sync task");
        })?;
        debug!(task_id = %task.id, kind = ?task.kind, "Enqueued sync task");
        Ok(())
    }
}
