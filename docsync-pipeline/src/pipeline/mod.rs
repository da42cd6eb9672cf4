//! Bulk pipeline.
//!
//! Streams records from a document's source, serializes them through the
//! document hooks and submits them to the backend in chunks. Chunks hold
//! exactly `chunk_size` records except the last one; records excluded by
//! `should_index` never reach a chunk.
//!
//! In sequential mode the first failing chunk aborts the run unless errors
//! are ignored. In parallel mode up to `workers` chunks are in flight at
//! once and failures are reported once every chunk has completed. An
//! unreachable backend always aborts the run.

mod progress;
mod report;
mod submit;

pub use progress::{Progress, ProgressSink, TracingProgress};
pub use report::{BulkReport, ItemFailure};
pub use submit::RetryPolicy;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use docsync_repository::{BulkOperation, BulkResponse, Connections, SearchBackend};
use docsync_shared::{BulkAction, Record};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, instrument, warn};

use crate::document::{Document, PrepareContext, DEFAULT_QUERYSET_PAGINATION};
use crate::errors::SyncError;
use crate::paginator::{BatchType, Paginator};
use crate::source::RecordQuery;
use submit::{submit_chunk, ChunkResult};

/// Process-wide pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records per chunk for documents without their own pagination.
    pub chunk_size: usize,
    /// Refresh indices after writes unless the document or the run says
    /// otherwise.
    pub auto_refresh: bool,
    /// Submit chunks concurrently by default.
    pub parallel: bool,
    /// Chunks in flight in parallel mode.
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_QUERYSET_PAGINATION,
            auto_refresh: false,
            parallel: false,
            workers: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Options of one bulk run.
#[derive(Clone)]
pub struct BulkOptions {
    pub action: BulkAction,
    pub query: RecordQuery,
    /// Overrides the document's chunk size.
    pub chunk_size: Option<usize>,
    pub batch_type: BatchType,
    /// Overrides the process default.
    pub parallel: Option<bool>,
    /// Overrides the document and process defaults.
    pub refresh: Option<bool>,
    /// Keep going after rejected documents and report them at the end.
    pub ignore_errors: bool,
    /// Write to these indices instead of the document's.
    pub indices: Option<Vec<String>>,
    pub context: PrepareContext,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl BulkOptions {
    pub fn new(action: BulkAction) -> Self {
        Self {
            action,
            query: RecordQuery::default(),
            chunk_size: None,
            batch_type: BatchType::default(),
            parallel: None,
            refresh: None,
            ignore_errors: false,
            indices: None,
            context: PrepareContext::default(),
            progress: None,
        }
    }

    pub fn with_query(mut self, query: RecordQuery) -> Self {
        self.query = query;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: Option<usize>) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_batch_type(mut self, batch_type: BatchType) -> Self {
        self.batch_type = batch_type;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    pub fn into_indices(mut self, indices: Vec<String>) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_context(mut self, context: PrepareContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Notified after every submitted chunk.
pub trait BulkObserver: Send + Sync {
    fn after_chunk(&self, document: &str, operations: &[BulkOperation], response: &BulkResponse);
}

/// Submits documents to the backend in chunks.
pub struct BulkPipeline {
    connections: Connections,
    config: PipelineConfig,
    observers: Vec<Arc<dyn BulkObserver>>,
}

impl BulkPipeline {
    pub fn new(connections: Connections, config: PipelineConfig) -> Self {
        Self {
            connections,
            config,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BulkObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// Backend of the document's connection.
    pub fn backend_for(&self, document: &dyn Document) -> Result<Arc<dyn SearchBackend>, SyncError> {
        Ok(self
            .connections
            .get(document.definition().connection.as_deref())?)
    }

    /// Run `options.action` over every record of the document's query.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkReport)` - Counters and failures; failures are only
    ///   returned here when `ignore_errors` is set
    /// * `Err(SyncError::DocumentRejected)` - If documents were rejected
    /// * `Err(SyncError)` - If the query is invalid or the backend is down
    #[instrument(skip_all, fields(document = %document.definition().name, action = %options.action))]
    pub async fn run(
        &self,
        document: &dyn Document,
        options: BulkOptions,
    ) -> Result<BulkReport, SyncError> {
        let chunk_size = self.chunk_size(document, &options);
        let query = document.query(options.query.clone());
        let mut paginator =
            Paginator::new(document.source(), query, chunk_size, options.batch_type).await?;

        let mut run = Run::start(self, document, &options, chunk_size, paginator.total(), false)?;
        while let Some(page) = paginator.next_page().await? {
            for record in page {
                run.push(record).await?;
            }
        }
        run.finish().await
    }

    /// Run `options.action` over the given records.
    ///
    /// Used by the sync handlers; a refresh, when configured, is part of
    /// every bulk request so the change is visible once this returns.
    #[instrument(skip_all, fields(document = %document.definition().name, action = %options.action, count = records.len()))]
    pub async fn apply(
        &self,
        document: &dyn Document,
        records: Vec<Record>,
        options: BulkOptions,
    ) -> Result<BulkReport, SyncError> {
        let chunk_size = self.chunk_size(document, &options);
        let mut run = Run::start(self, document, &options, chunk_size, records.len(), true)?;
        for record in records {
            run.push(record).await?;
        }
        run.finish().await
    }

    fn chunk_size(&self, document: &dyn Document, options: &BulkOptions) -> usize {
        match options.chunk_size {
            Some(size) if size > 0 => size,
            _ => document.definition().chunk_size(self.config.chunk_size),
        }
    }
}

/// State of one bulk run.
struct Run<'a> {
    pipeline: &'a BulkPipeline,
    document: &'a dyn Document,
    options: &'a BulkOptions,
    backend: Arc<dyn SearchBackend>,
    indices: Vec<String>,
    chunk_size: usize,
    parallel: bool,
    workers: usize,
    refresh: bool,
    refresh_per_request: bool,
    buffer: Vec<BulkOperation>,
    buffered: usize,
    in_flight: FuturesUnordered<BoxFuture<'static, Result<ChunkResult, SyncError>>>,
    report: BulkReport,
    started: Instant,
}

impl<'a> Run<'a> {
    fn start(
        pipeline: &'a BulkPipeline,
        document: &'a dyn Document,
        options: &'a BulkOptions,
        chunk_size: usize,
        total: usize,
        refresh_per_request: bool,
    ) -> Result<Self, SyncError> {
        let definition = document.definition();
        let indices = options
            .indices
            .clone()
            .unwrap_or_else(|| definition.index_names());
        if indices.is_empty() {
            return Err(SyncError::configuration(format!(
                "document '{}' has no index to write to",
                definition.name
            )));
        }

        let refresh = options
            .refresh
            .or(definition.auto_refresh)
            .unwrap_or(pipeline.config.auto_refresh);
        let mut report = BulkReport::new(definition.name.clone(), options.action);
        report.total = total;

        info!(total, chunk_size, indices = ?indices, "Starting bulk run");

        Ok(Self {
            pipeline,
            document,
            options,
            backend: pipeline.backend_for(document)?,
            indices,
            chunk_size,
            parallel: options.parallel.unwrap_or(pipeline.config.parallel),
            workers: pipeline.config.workers.max(1),
            refresh,
            refresh_per_request,
            buffer: Vec::new(),
            buffered: 0,
            in_flight: FuturesUnordered::new(),
            report,
            started: Instant::now(),
        })
    }

    fn fail_fast(&self) -> bool {
        !self.options.ignore_errors && !self.parallel
    }

    fn rejected(&self) -> SyncError {
        SyncError::DocumentRejected {
            failures: self.report.failures.clone(),
        }
    }

    async fn push(&mut self, record: Record) -> Result<(), SyncError> {
        let action = self.options.action;
        if action != BulkAction::Delete && !self.document.should_index(&record) {
            self.report.skipped += 1;
            self.report.processed += 1;
            return Ok(());
        }

        let id = self.document.generate_id(&record);
        let source = if action.has_body() {
            match self.document.prepare(&record, &self.options.context) {
                Ok(body) => Some(body),
                Err(SyncError::Serialization(reason)) => {
                    warn!(id = %id, reason = %reason, "Could not prepare document");
                    self.report.processed += 1;
                    self.report.failures.push(ItemFailure {
                        index: self.indices[0].clone(),
                        id,
                        status: None,
                        reason: "serialization_error".to_string(),
                    });
                    return if self.fail_fast() {
                        Err(self.rejected())
                    } else {
                        Ok(())
                    };
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        for index in &self.indices {
            self.buffer.push(BulkOperation {
                action,
                index: index.clone(),
                id: id.clone(),
                source: source.clone(),
            });
        }
        self.buffered += 1;

        if self.buffered >= self.chunk_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SyncError> {
        if self.buffered == 0 {
            return Ok(());
        }
        let operations = std::mem::take(&mut self.buffer);
        let records = std::mem::replace(&mut self.buffered, 0);
        let submission = submit_chunk(
            self.backend.clone(),
            operations,
            records,
            self.refresh && self.refresh_per_request,
            self.pipeline.config.retry.clone(),
        );

        if self.parallel {
            while self.in_flight.len() >= self.workers {
                self.complete_next().await?;
            }
            self.in_flight.push(Box::pin(submission));
            Ok(())
        } else {
            let chunk = submission.await?;
            self.absorb(chunk)
        }
    }

    async fn complete_next(&mut self) -> Result<(), SyncError> {
        if let Some(result) = self.in_flight.next().await {
            self.absorb(result?)?;
        }
        Ok(())
    }

    fn absorb(&mut self, chunk: ChunkResult) -> Result<(), SyncError> {
        for observer in &self.pipeline.observers {
            observer.after_chunk(&self.report.document, &chunk.operations, &chunk.response);
        }

        self.report.chunk_sizes.push(chunk.records);
        self.report.processed += chunk.records;

        // A record spans one operation per index; it fails if any of them does.
        let mut rejected: BTreeSet<&str> = BTreeSet::new();
        for item in &chunk.response.items {
            if !item.succeeded() {
                rejected.insert(item.id.as_str());
                warn!(
                    index = %item.index,
                    id = %item.id,
                    status = item.status,
                    reason = %item.reason(),
                    "Document rejected"
                );
                self.report.failures.push(ItemFailure::from_item(item));
            }
        }
        self.report.succeeded += chunk.records.saturating_sub(rejected.len());
        let failed = !rejected.is_empty();

        if let Some(sink) = &self.options.progress {
            sink.on_progress(&self.progress());
        }

        if failed && self.fail_fast() {
            return Err(self.rejected());
        }
        Ok(())
    }

    fn progress(&self) -> Progress {
        Progress {
            document: self.report.document.clone(),
            action: self.options.action,
            done: self.report.processed,
            total: self.report.total,
            elapsed: self.started.elapsed(),
        }
    }

    async fn finish(mut self) -> Result<BulkReport, SyncError> {
        self.flush().await?;
        while !self.in_flight.is_empty() {
            self.complete_next().await?;
        }

        if self.refresh && !self.refresh_per_request {
            self.backend.refresh(&self.indices).await?;
        }
        if let Some(sink) = &self.options.progress {
            sink.on_finish(&self.progress());
        }

        info!(
            chunks = self.report.chunks(),
            succeeded = self.report.succeeded,
            skipped = self.report.skipped,
            failed = self.report.failed(),
            "Bulk run completed"
        );

        if !self.report.failures.is_empty() && !self.options.ignore_errors {
            return Err(self.rejected());
        }
        Ok(self.report)
    }
}
