//! Chunk submission with retries.

use std::sync::Arc;
use std::time::Duration;

use docsync_repository::{BulkOperation, BulkResponse, SearchBackend, SearchError};
use tracing::{debug, info, warn};

use crate::errors::SyncError;

/// Retry behaviour for bulk submissions.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay_ms: u64) -> u64 {
        (delay_ms * 2).min(self.max_delay_ms)
    }
}

/// A chunk as submitted, with the final result of every operation.
#[derive(Debug, Clone)]
pub(crate) struct ChunkResult {
    pub operations: Vec<BulkOperation>,
    pub response: BulkResponse,
    /// Records the chunk was built from.
    pub records: usize,
}

fn is_retryable(err: &SearchError) -> bool {
    match err {
        SearchError::ConnectionError(_) => true,
        SearchError::RequestError { status, .. } => matches!(status, 429 | 503),
        _ => false,
    }
}

async fn bulk_with_retry(
    backend: &dyn SearchBackend,
    operations: &[BulkOperation],
    refresh: bool,
    policy: &RetryPolicy,
) -> Result<BulkResponse, SyncError> {
    let mut delay_ms = policy.initial_delay_ms;

    for attempt in 0..=policy.max_retries {
        match backend.bulk(operations, refresh).await {
            Ok(response) => {
                if attempt > 0 {
                    info!(attempt, count = operations.len(), "Bulk request succeeded after retry");
                }
                return Ok(response);
            }
            Err(err) if is_retryable(&err) && attempt < policy.max_retries => {
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms,
                    error = %err,
                    "Bulk request failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = policy.next_delay(delay_ms);
            }
            Err(err) => {
                debug!(error = %err, "Bulk request failed");
                return Err(err.into());
            }
        }
    }

    Err(SyncError::BackendUnavailable(
        "bulk request retries exhausted".to_string(),
    ))
}

/// Submit one chunk.
///
/// Items failing with a transient status are resubmitted with exponential
/// backoff; their final result replaces the first one. Other item failures
/// are final.
///
/// # Returns
///
/// * `Ok(ChunkResult)` - One result per operation, failures included
/// * `Err(SyncError)` - If the request as a whole failed after retries
pub(crate) async fn submit_chunk(
    backend: Arc<dyn SearchBackend>,
    operations: Vec<BulkOperation>,
    records: usize,
    refresh: bool,
    policy: RetryPolicy,
) -> Result<ChunkResult, SyncError> {
    let mut response = bulk_with_retry(backend.as_ref(), &operations, refresh, &policy).await?;
    let mut delay_ms = policy.initial_delay_ms;

    for attempt in 1..=policy.max_retries {
        let pending: Vec<usize> = response
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_transient())
            .map(|(position, _)| position)
            .collect();
        if pending.is_empty() {
            break;
        }

        warn!(
            attempt,
            max_retries = policy.max_retries,
            count = pending.len(),
            delay_ms,
            "Resubmitting transiently rejected items"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        delay_ms = policy.next_delay(delay_ms);

        let retry: Vec<BulkOperation> = pending
            .iter()
            .map(|&position| operations[position].clone())
            .collect();
        let retried = bulk_with_retry(backend.as_ref(), &retry, refresh, &policy).await?;
        for (position, item) in pending.into_iter().zip(retried.items) {
            response.items[position] = item;
        }
    }

    Ok(ChunkResult {
        operations,
        response,
        records,
    })
}
