//! Progress reporting for long bulk runs.

use std::time::Duration;

use docsync_shared::BulkAction;
use tracing::info;

/// Snapshot of a running bulk run.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub document: String,
    pub action: BulkAction,
    pub done: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.done.min(self.total) * 100) / self.total) as u8
    }

    /// Estimated time left: `~` before anything is done, seconds up to two
    /// minutes, minutes beyond.
    pub fn eta(&self) -> String {
        if self.done == 0 {
            return "~".to_string();
        }
        let remaining = self.total.saturating_sub(self.done) as f64;
        let per_record = self.elapsed.as_secs_f64() / self.done as f64;
        let secs = (per_record * remaining).round() as u64;

        if secs > 120 {
            format!("{} mins", secs / 60)
        } else {
            format!("{} secs", secs)
        }
    }
}

/// Receives progress while a run advances.
pub trait ProgressSink: Send + Sync {
    /// Called after every completed chunk.
    fn on_progress(&self, progress: &Progress);

    /// Called once the run is over.
    fn on_finish(&self, _progress: &Progress) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_progress(&self, progress: &Progress) {
        info!(
            document = %progress.document,
            action = %progress.action,
            done = progress.done,
            total = progress.total,
            percent = progress.percent(),
            eta = %progress.eta(),
            "Bulk progress"
        );
    }

    fn on_finish(&self, progress: &Progress) {
        info!(
            document = %progress.document,
            action = %progress.action,
            done = progress.done,
            elapsed_ms = progress.elapsed.as_millis() as u64,
            "Bulk run finished"
        );
    }
}
