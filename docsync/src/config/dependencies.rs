//! Dependency initialization and wiring.

use std::sync::Arc;

use docsync_pipeline::sync::{
    ChannelTaskQueue, DeferredProcessor, JsonTaskCodec, RealTimeProcessor, TaskWorker,
};
use docsync_pipeline::{
    BulkPipeline, DocumentManager, DocumentRegistry, IndexManager, IndexSync, SignalProcessor,
};
use docsync_repository::{Connections, SearchBackend};
use tokio::sync::mpsc;
use tracing::info;

use super::settings::{ProcessorKind, Settings};
use crate::{manifest, DocsyncError};

/// Payloads the deferred queue holds before producers wait.
const TASK_QUEUE_CAPACITY: usize = 1024;

/// Worker side of the deferred task queue.
pub struct DeferredWorker {
    pub worker: TaskWorker,
    pub receiver: mpsc::Receiver<Vec<u8>>,
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub settings: Settings,
    pub registry: Arc<DocumentRegistry>,
    pub pipeline: Arc<BulkPipeline>,
    pub indices: IndexManager,
    pub documents: DocumentManager,
    /// Receives mutation events, see the `sync` command.
    pub processor: Arc<dyn SignalProcessor>,
    /// Set with the deferred processor; the `sync` command takes it and runs
    /// the worker while events are replayed.
    pub deferred: Option<DeferredWorker>,
}

impl Dependencies {
    /// Initialize all dependencies from settings.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(DocsyncError)` - If a connection cannot be built, the cluster
    ///   is unhealthy or the manifest cannot be loaded
    pub async fn new(settings: Settings) -> Result<Self, DocsyncError> {
        info!(
            connections = settings.connections.len(),
            manifest = %settings.manifest.display(),
            "Initializing dependencies"
        );

        let connections = Connections::from_configs(&settings.connections)?;

        let healthy = connections
            .default_backend()?
            .health_check()
            .await
            .map_err(|e| DocsyncError::config(format!("OpenSearch health check failed: {}", e)))?;
        if !healthy {
            return Err(DocsyncError::config("OpenSearch cluster is unhealthy"));
        }
        info!("OpenSearch connection verified");

        let registry = manifest::load(&settings.manifest)?;
        Ok(Self::build(settings, connections, registry))
    }

    /// Wire the components over existing connections and documents.
    pub fn build(settings: Settings, connections: Connections, registry: DocumentRegistry) -> Self {
        let registry = Arc::new(registry);
        let pipeline = Arc::new(BulkPipeline::new(connections.clone(), settings.pipeline.clone()));
        let sync = Arc::new(IndexSync::new(
            registry.clone(),
            pipeline.clone(),
            settings.autosync,
        ));

        let indices = IndexManager::new(
            registry.clone(),
            connections,
            settings.index_settings.clone(),
        );
        let documents = DocumentManager::new(
            registry.clone(),
            pipeline.clone(),
            settings.index_settings.clone(),
        );

        let (processor, deferred): (Arc<dyn SignalProcessor>, _) = match settings.signal_processor {
            ProcessorKind::RealTime => (
                Arc::new(RealTimeProcessor::new(sync.clone())) as Arc<dyn SignalProcessor>,
                None,
            ),
            ProcessorKind::Deferred => {
                let codec = Arc::new(JsonTaskCodec);
                let (queue, receiver) = ChannelTaskQueue::channel(TASK_QUEUE_CAPACITY);
                let processor = DeferredProcessor::new(Arc::new(queue), codec.clone(), settings.autosync);
                let worker = TaskWorker::new(sync.clone(), codec);
                (
                    Arc::new(processor) as Arc<dyn SignalProcessor>,
                    Some(DeferredWorker { worker, receiver }),
                )
            }
        };

        info!(
            documents = registry.len(),
            processor = ?settings.signal_processor,
            autosync = settings.autosync,
            "Dependencies ready"
        );

        Self {
            settings,
            registry,
            pipeline,
            indices,
            documents,
            processor,
            deferred,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_pipeline::{DocumentDefinition, FieldSpec, IndexSpec, MemorySource, ModelDocument};
    use docsync_pipeline::MutationEvent;
    use docsync_shared::Record;

    fn settings(kind: ProcessorKind) -> Settings {
        let mut settings = Settings::from_lookup(|_| None).unwrap();
        settings.signal_processor = kind;
        settings
    }

    fn registry() -> DocumentRegistry {
        let mut registry = DocumentRegistry::new();
        let definition = DocumentDefinition::new("CountryDocument", "Country")
            .with_index(IndexSpec::new("country"))
            .with_field(FieldSpec::new("name", "text"));
        registry
            .register(Arc::new(ModelDocument::new(
                definition,
                Arc::new(MemorySource::new("Country", Vec::new())),
            )))
            .unwrap();
        registry
    }

    fn build(kind: ProcessorKind) -> Dependencies {
        let settings = settings(kind);
        let connections = Connections::from_configs(&settings.connections).unwrap();
        Dependencies::build(settings, connections, registry())
    }

    #[test]
    fn test_build_real_time() {
        let deps = build(ProcessorKind::RealTime);
        assert!(deps.deferred.is_none());
        assert!(deps.settings.autosync);
        assert_eq!(deps.registry.index_names(), vec!["country"]);
        assert_eq!(deps.pipeline.config().chunk_size, 4096);
    }

    #[tokio::test]
    async fn test_build_deferred_enqueues() {
        let mut deps = build(ProcessorKind::Deferred);
        let mut deferred = deps.deferred.take().unwrap();

        deps.processor
            .handle(MutationEvent::saved(Record::new("Country", 1)))
            .await
            .unwrap();

        let payload = deferred.receiver.recv().await.unwrap();
        assert!(!payload.is_empty());
    }
}
