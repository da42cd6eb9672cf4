//! Command line interface.

mod output;
mod prompt;
mod run;

pub use output::{
    format_index_list, format_plan, format_summary, format_validation, TerminalProgress,
};
pub use prompt::confirm;
pub use run::run;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use docsync_pipeline::{BatchType, DocumentCommand, IndexCommand};
use docsync_shared::CommandAction;

#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(about = "Manage search indices and the documents in them", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show more output; twice also prints the ids of rejected documents
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, delete, rebuild or update indices
    Index(IndexArgs),
    /// List registered indices, whether they exist and their document counts
    List,
    /// Index, delete, update or migrate documents
    Document(DocumentArgs),
    /// Search an index and print the matching records
    Search(SearchArgs),
    /// Replay mutation events, one JSON object per line
    Sync(SyncArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexAction {
    Create,
    Delete,
    Rebuild,
    Update,
}

impl From<IndexAction> for CommandAction {
    fn from(action: IndexAction) -> Self {
        match action {
            IndexAction::Create => Self::Create,
            IndexAction::Delete => Self::Delete,
            IndexAction::Rebuild => Self::Rebuild,
            IndexAction::Update => Self::Update,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentAction {
    Index,
    Delete,
    Update,
    Migrate,
}

impl From<DocumentAction> for CommandAction {
    fn from(action: DocumentAction) -> Self {
        match action {
            DocumentAction::Index => Self::Index,
            DocumentAction::Delete => Self::Delete,
            DocumentAction::Update => Self::Update,
            DocumentAction::Migrate => Self::Migrate,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BatchTypeArg {
    #[default]
    Offset,
    PkFilters,
}

impl From<BatchTypeArg> for BatchType {
    fn from(batch_type: BatchTypeArg) -> Self {
        match batch_type {
            BatchTypeArg::Offset => Self::Offset,
            BatchTypeArg::PkFilters => Self::PkFilters,
        }
    }
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[arg(value_enum)]
    pub action: IndexAction,

    /// Indices to act on (default: every registered index)
    pub indices: Vec<String>,

    /// Act on the versioned index NAME--SUFFIX
    #[arg(long)]
    pub suffix: Option<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,

    /// Keep going when an index fails
    #[arg(long)]
    pub ignore_error: bool,
}

impl IndexArgs {
    pub fn to_command(&self) -> IndexCommand {
        IndexCommand {
            action: self.action.into(),
            indices: self.indices.clone(),
            suffix: self.suffix.clone(),
            ignore_error: self.ignore_error,
        }
    }
}

#[derive(Args, Debug)]
pub struct DocumentArgs {
    #[arg(value_enum)]
    pub action: DocumentAction,

    /// Only records matching every lookup
    #[arg(short = 'f', long, num_args = 1.., value_name = "FIELD[__LOOKUP]=VALUE")]
    pub filters: Vec<String>,

    /// Leave out records matching any lookup
    #[arg(short = 'e', long, num_args = 1.., value_name = "FIELD[__LOOKUP]=VALUE")]
    pub excludes: Vec<String>,

    /// Only these indices
    #[arg(short, long, num_args = 1..)]
    pub indices: Vec<String>,

    /// Only the indices of these models
    #[arg(short, long, num_args = 1..)]
    pub objects: Vec<String>,

    /// Act on at most this many records per index
    #[arg(short, long)]
    pub count: Option<usize>,

    /// Submit chunks concurrently
    #[arg(long, conflicts_with = "no_parallel")]
    pub parallel: bool,

    /// Submit chunks one after the other
    #[arg(long)]
    pub no_parallel: bool,

    /// Refresh the indices once done
    #[arg(long)]
    pub refresh: bool,

    /// Only records not in the index yet (index action)
    #[arg(short, long)]
    pub missing: bool,

    /// Write to the versioned index NAME--SUFFIX
    #[arg(long)]
    pub index_suffix: Option<String>,

    /// Records per chunk
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// How records are paginated
    #[arg(long, value_enum, default_value_t = BatchTypeArg::Offset)]
    pub batch_type: BatchTypeArg,

    /// Do not ask for confirmation
    #[arg(long)]
    pub force: bool,

    /// Exit successfully even if documents were rejected
    #[arg(long)]
    pub ignore_error: bool,
}

impl DocumentArgs {
    pub fn to_command(&self) -> DocumentCommand {
        let parallel = match (self.parallel, self.no_parallel) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        DocumentCommand {
            action: self.action.into(),
            filters: self.filters.clone(),
            excludes: self.excludes.clone(),
            indices: self.indices.clone(),
            objects: self.objects.clone(),
            count: self.count,
            parallel,
            refresh: self.refresh.then_some(true),
            missing: self.missing,
            index_suffix: self.index_suffix.clone(),
            batch_size: self.batch_size,
            batch_type: self.batch_type.into(),
            ignore_error: self.ignore_error,
        }
    }
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Index to search
    pub index: String,

    /// Query DSL object
    #[arg(short, long, default_value = r#"{"match_all": {}}"#)]
    pub query: String,

    /// Number of hits
    #[arg(short, long, default_value_t = 10)]
    pub size: u64,

    /// Print records in hit order instead of primary key order
    #[arg(long)]
    pub keep_order: bool,

    /// Only check whether the query is valid
    #[arg(long)]
    pub validate: bool,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Read events from this file instead of standard input
    #[arg(long)]
    pub file: Option<PathBuf>,
}
