//! Command execution.

use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::sync::Arc;

use docsync_pipeline::management::select_indices;
use docsync_pipeline::pipeline::{ProgressSink, TracingProgress};
use docsync_pipeline::{DocumentSearch, MutationEvent, SignalProcessor, SyncError};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use super::output::{
    format_index_list, format_plan, format_summary, format_validation, title, TerminalProgress,
};
use super::prompt::confirm;
use super::{Cli, Commands, DocumentArgs, IndexArgs, SearchArgs, SyncArgs};
use crate::config::DeferredWorker;
use crate::{Dependencies, DocsyncError};

/// Run the parsed command line.
///
/// # Returns
///
/// * `Ok(true)` - If the command succeeded
/// * `Ok(false)` - If it was declined at the prompt, documents were
///   rejected without `--ignore-error`, a query is invalid, or events
///   failed to sync
/// * `Err(DocsyncError)` - If the command could not run to completion
pub async fn run<R: BufRead, W: Write>(
    cli: &Cli,
    deps: &mut Dependencies,
    input: &mut R,
    out: &mut W,
) -> Result<bool, DocsyncError> {
    match &cli.command {
        Commands::Index(args) => run_index(args, cli.verbose, deps, input, out).await,
        Commands::List => {
            let statuses = deps.indices.list().await?;
            writeln!(out, "{}", format_index_list(&statuses))?;
            Ok(true)
        }
        Commands::Document(args) => run_document(args, cli.verbose, deps, input, out).await,
        Commands::Search(args) => run_search(args, deps, out).await,
        Commands::Sync(args) => run_sync(args, deps, input, out).await,
    }
}

#[instrument(skip_all, fields(action = ?args.action))]
async fn run_index<R: BufRead, W: Write>(
    args: &IndexArgs,
    verbose: u8,
    deps: &Dependencies,
    input: &mut R,
    out: &mut W,
) -> Result<bool, DocsyncError> {
    let command = args.to_command();
    let selected = deps.indices.select(&command.indices)?;

    if verbose > 0 || !args.force {
        writeln!(out, "The following indices will be {}:", command.action.past())?;
        for index in &selected {
            writeln!(out, "\t- {}.", index)?;
        }
        writeln!(out)?;
    }
    if !args.force && !confirm(input, out)? {
        info!("Declined at prompt");
        return Ok(false);
    }

    let outcomes = deps.indices.execute(&command).await?;
    let action = title(command.action.present_participle());
    let mut succeeded = true;
    for outcome in &outcomes {
        match &outcome.error {
            None => writeln!(out, "{} index '{}'... OK", action, outcome.target)?,
            Some(error) => {
                succeeded = false;
                writeln!(out, "{} index '{}'...\nError: {}", action, outcome.target, error)?;
            }
        }
    }
    Ok(succeeded || args.ignore_error)
}

#[instrument(skip_all, fields(action = ?args.action))]
async fn run_document<R: BufRead, W: Write>(
    args: &DocumentArgs,
    verbose: u8,
    deps: &Dependencies,
    input: &mut R,
    out: &mut W,
) -> Result<bool, DocsyncError> {
    let command = args.to_command();
    let plan = deps.documents.plan(&command).await?;

    if verbose > 0 || !args.force {
        writeln!(out, "{}\n", format_plan(&plan))?;
    }
    if !args.force && !confirm(input, out)? {
        info!("Declined at prompt");
        return Ok(false);
    }

    let progress: Arc<dyn ProgressSink> = if io::stderr().is_terminal() {
        Arc::new(TerminalProgress::stderr())
    } else {
        Arc::new(TracingProgress)
    };
    let results = deps
        .documents
        .execute(&command, &plan, Some(progress))
        .await?;

    let mut succeeded = true;
    for result in &results {
        if result.error.is_some() || !result.report.failures.is_empty() {
            succeeded = false;
        }
        write!(out, "{}", format_summary(result, command.action, verbose > 1))?;
    }
    Ok(succeeded || args.ignore_error)
}

#[instrument(skip_all, fields(index = %args.index))]
async fn run_search<W: Write>(
    args: &SearchArgs,
    deps: &Dependencies,
    out: &mut W,
) -> Result<bool, DocsyncError> {
    let index = select_indices(&deps.registry, std::slice::from_ref(&args.index))?
        .into_iter()
        .next()
        .ok_or_else(|| DocsyncError::config("no index to search"))?;
    let document = deps
        .registry
        .document_for_index(&index)
        .ok_or_else(|| SyncError::not_found(format!("no document indexes '{}'", index)))?;
    let query: Value = serde_json::from_str(&args.query)
        .map_err(|e| DocsyncError::config(format!("invalid query: {}", e)))?;

    let backend = deps.pipeline.backend_for(document.as_ref())?;
    let search = DocumentSearch::new(document, backend)?
        .query(query)
        .size(args.size);

    if args.validate {
        let validation = search.validate().await?;
        writeln!(out, "{}", format_validation(&index, &validation))?;
        return Ok(validation.valid);
    }

    for record in search.to_records(args.keep_order).await? {
        let line = serde_json::to_string(&record).map_err(SyncError::from)?;
        writeln!(out, "{}", line)?;
    }
    Ok(true)
}

/// Events read by `sync`.
#[derive(Debug, Default, PartialEq, Eq)]
struct Replay {
    events: usize,
    failed: usize,
}

/// Hand every event of `reader` to `processor`. Blank lines are skipped;
/// events that cannot be parsed or synced are counted as failed.
async fn replay(reader: &mut dyn BufRead, processor: &dyn SignalProcessor) -> Result<Replay, DocsyncError> {
    let mut replay = Replay::default();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        replay.events += 1;

        let event: MutationEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = number + 1, error = %e, "Invalid mutation event");
                replay.failed += 1;
                continue;
            }
        };
        if let Err(e) = processor.handle(event).await {
            error!(line = number + 1, error = %e, "Failed to sync mutation event");
            replay.failed += 1;
        }
    }
    Ok(replay)
}

/// Replay events through the configured signal processor. With the
/// deferred processor the task worker runs alongside and executes every
/// queued task before the command returns.
#[instrument(skip_all)]
async fn run_sync<R: BufRead, W: Write>(
    args: &SyncArgs,
    deps: &mut Dependencies,
    input: &mut R,
    out: &mut W,
) -> Result<bool, DocsyncError> {
    let mut file;
    let reader: &mut dyn BufRead = match &args.file {
        Some(path) => {
            file = BufReader::new(File::open(path)?);
            &mut file
        }
        None => input,
    };

    let processor = deps.processor.clone();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let feed = async move {
        let replayed = replay(reader, processor.as_ref()).await;
        // The worker drains what is queued, then stops.
        let _ = shutdown_tx.send(());
        replayed
    };

    let (replayed, executed) = match deps.deferred.take() {
        Some(DeferredWorker { worker, receiver }) => {
            let (replayed, executed) = tokio::join!(feed, worker.run(receiver, shutdown_rx));
            (replayed?, Some(executed))
        }
        None => (feed.await?, None),
    };

    write!(out, "Replayed {} events, {} failed", replayed.events, replayed.failed)?;
    match executed {
        Some(executed) => writeln!(out, ", {} deferred tasks executed", executed)?,
        None => writeln!(out)?,
    }
    info!(events = replayed.events, failed = replayed.failed, "Events replayed");
    Ok(replayed.failed == 0)
}
