//! Deferred sync tasks.
//!
//! A task captures the mutated record at event time, so a delete can still
//! be applied after the record is gone from its source. Tasks travel as
//! opaque payloads; the codec and the queue are pluggable.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_shared::Record;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::signals::execute;
use super::IndexSync;
use crate::errors::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Re-index the record and the records embedding it.
    Save,
    /// Delete the record and re-index the records embedding it.
    Delete,
}

/// A unit of deferred sync work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: Uuid,
    pub kind: TaskKind,
    pub record: Record,
    pub enqueued_at: DateTime<Utc>,
}

impl SyncTask {
    pub fn new(kind: TaskKind, record: Record) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            record,
            enqueued_at: Utc::now(),
        }
    }
}

/// Turns tasks into queue payloads and back.
pub trait TaskCodec: Send + Sync {
    fn encode(&self, task: &SyncTask) -> Result<Vec<u8>, SyncError>;

    fn decode(&self, payload: &[u8]) -> Result<SyncTask, SyncError>;
}

/// JSON payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTaskCodec;

impl TaskCodec for JsonTaskCodec {
    fn encode(&self, task: &SyncTask) -> Result<Vec<u8>, SyncError> {
        Ok(serde_json::to_vec(task)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<SyncTask, SyncError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Destination of deferred tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, payload: Vec<u8>) -> Result<(), SyncError>;
}

/// In-process queue over a bounded channel.
#[derive(Clone)]
pub struct ChannelTaskQueue {
    sender: mpsc::Sender<Vec<u8>>,
}

impl ChannelTaskQueue {
    /// Create a queue and the receiver a [`TaskWorker`] consumes.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TaskQueue for ChannelTaskQueue {
    async fn submit(&self, payload: Vec<u8>) -> Result<(), SyncError> {
        self.sender
            .send(payload)
            .await
            .map_err(|_| SyncError::task("task queue is closed"))
    }
}

/// Executes queued tasks.
pub struct TaskWorker {
    sync: Arc<IndexSync>,
    codec: Arc<dyn TaskCodec>,
}

impl TaskWorker {
    pub fn new(sync: Arc<IndexSync>, codec: Arc<dyn TaskCodec>) -> Self {
        Self { sync, codec }
    }

    /// Decode and apply one payload.
    #[instrument(skip_all)]
    pub async fn execute(&self, payload: &[u8]) -> Result<SyncTask, SyncError> {
        let task = self.codec.decode(payload)?;
        debug!(
            task_id = %task.id,
            kind = ?task.kind,
            model = %task.record.model,
            pk = %task.record.pk,
            "Executing sync task"
        );
        execute(&self.sync, task.kind, &task.record).await?;
        Ok(task)
    }

    /// Execute payloads until the queue closes or shutdown is signalled.
    ///
    /// Payloads already queued when shutdown is signalled are still
    /// executed. Failed tasks are logged and dropped; redelivery is up to the
    /// queue.
    pub async fn run(
        &self,
        mut receiver: mpsc::Receiver<Vec<u8>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> usize {
        info!("Starting sync task worker");
        let mut executed = 0;

        loop {
            tokio::select! {
                payload = receiver.recv() => {
                    match payload {
                        Some(payload) => executed += self.execute_logged(&payload).await,
                        None => {
                            info!("Task queue closed");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Received shutdown signal");
                    while let Ok(payload) = receiver.try_recv() {
                        executed += self.execute_logged(&payload).await;
                    }
                    break;
                }
            }
        }

        info!(executed, "Sync task worker stopped");
        executed
    }

    /// 1 if the payload was applied, 0 if it failed.
    async fn execute_logged(&self, payload: &[u8]) -> usize {
        match self.execute(payload).await {
            Ok(_) => 1,
            Err(e) => {
                error!(error = %e, "Failed to execute sync task");
                0
            }
        }
    }
}
