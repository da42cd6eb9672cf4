//! Text written by the commands.

use std::io::{self, Write};
use std::sync::Mutex;

use docsync_pipeline::management::{DocumentPlan, EntryResult, IndexStatus};
use docsync_pipeline::pipeline::{Progress, ProgressSink};
use docsync_repository::QueryValidation;
use docsync_shared::{BulkAction, CommandAction};

/// Capitalize the first letter.
pub(crate) fn title(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `[X] name (N documents)` for existing indices, `[ ] name` otherwise.
pub fn format_index_list(statuses: &[IndexStatus]) -> String {
    let mut lines = Vec::new();
    for status in statuses {
        let checkbox = if status.exists { "[X]" } else { "[ ]" };
        let mut line = format!("{} {}", checkbox, status.index);
        if let Some(count) = status.count {
            line.push_str(&format!(" ({} documents)", count));
        }
        if let Some(version) = status
            .active_version
            .as_deref()
            .filter(|version| *version != status.index)
        {
            line.push_str(&format!(" -> {}", version));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// What a document command is about to do.
pub fn format_plan(plan: &DocumentPlan) -> String {
    let mut text = format!("The following documents will be {}:", plan.action.past());
    for entry in &plan.entries {
        text.push_str(&format!("\n\t- {} {}.", entry.expected, entry.model));
        if entry.target != entry.index {
            text.push_str(&format!(" (into '{}')", entry.target));
        }
    }
    text
}

/// Outcome of a document command on one index.
///
/// Errors are grouped by reason with their count; with `verbose` set the
/// ids of rejected documents follow.
pub fn format_summary(result: &EntryResult, action: CommandAction, verbose: bool) -> String {
    let report = &result.report;
    if let Some(error) = &result.error {
        return format!("{} {} failed: {}\n", title(action.present_participle()), result.model, error);
    }

    let mut text = format!(
        "{} {} successfully {}, {} errors:\n",
        report.succeeded,
        result.model,
        action.past(),
        report.failed()
    );
    for (reason, count) in report.failure_reasons() {
        text.push_str(&format!("    - {} : {}\n", reason, count));
    }
    if verbose && !report.failures.is_empty() {
        let ids: Vec<&str> = report.failures.iter().map(|f| f.id.as_str()).collect();
        text.push_str(&format!("    ids: {}\n", ids.join(", ")));
    }
    text
}

/// Whether a query is valid, with the backend's reasons when it is not.
pub fn format_validation(index: &str, validation: &QueryValidation) -> String {
    if validation.valid {
        return format!("Query is valid for '{}'.", index);
    }
    let mut text = format!("Query is invalid for '{}':", index);
    for error in &validation.errors {
        text.push_str(&format!("\n    - {}", error));
    }
    text
}

fn action_title(action: BulkAction) -> &'static str {
    match action {
        BulkAction::Index => "Indexing",
        BulkAction::Create => "Creating",
        BulkAction::Update => "Updating",
        BulkAction::Delete => "Deleting",
    }
}

/// Progress line rewritten in place on a terminal.
pub struct TerminalProgress<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalProgress<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self, line: &str) {
        if let Ok(mut out) = self.out.lock() {
            // Best effort.
            let _ = out.write_all(line.as_bytes());
            let _ = out.flush();
        }
    }
}

impl<W: Write + Send> ProgressSink for TerminalProgress<W> {
    fn on_progress(&self, progress: &Progress) {
        self.write(&format!(
            "{} {}: {}% ({})\r",
            action_title(progress.action),
            progress.document,
            progress.percent(),
            progress.eta()
        ));
    }

    fn on_finish(&self, progress: &Progress) {
        self.write(&format!(
            "{} {} {}: OK          \n",
            action_title(progress.action),
            progress.done,
            progress.document
        ));
    }
}
