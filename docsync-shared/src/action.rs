//! Bulk and command actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation applied to a set of index records in one bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Create or fully replace the document.
    Index,
    /// Create the document, failing if it already exists.
    Create,
    /// Partial update of an existing document.
    Update,
    /// Remove the document.
    Delete,
}

impl BulkAction {
    /// The operation name used in the bulk wire format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the operation carries a document body.
    pub fn has_body(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions exposed by the management commands.
///
/// Each action knows its present participle and past tense so progress and
/// summary lines read naturally ("Indexing Country: 40%", "12 Country
/// successfully indexed").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandAction {
    Index,
    Update,
    Create,
    Rebuild,
    Migrate,
    List,
    Delete,
}

impl CommandAction {
    pub fn value(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Update => "update",
            Self::Create => "create",
            Self::Rebuild => "rebuild",
            Self::Migrate => "migrate",
            Self::List => "list",
            Self::Delete => "delete",
        }
    }

    pub fn present_participle(&self) -> &'static str {
        match self {
            Self::Index => "indexing",
            Self::Update => "updating",
            Self::Create => "creating",
            Self::Rebuild => "rebuilding",
            Self::Migrate => "migrating",
            Self::List => "listing",
            Self::Delete => "deleting",
        }
    }

    pub fn past(&self) -> &'static str {
        match self {
            Self::Index => "indexed",
            Self::Update => "updated",
            Self::Create => "created",
            Self::Rebuild => "rebuilt",
            Self::Migrate => "migrated",
            Self::List => "listed",
            Self::Delete => "deleted",
        }
    }

    /// The bulk operation a document command translates to.
    ///
    /// Migration indexes every document into the new index version, so it
    /// maps to [`BulkAction::Index`]. Index lifecycle actions have no bulk
    /// counterpart.
    pub fn bulk_action(&self) -> Option<BulkAction> {
        match self {
            Self::Index | Self::Migrate => Some(BulkAction::Index),
            Self::Update => Some(BulkAction::Update),
            Self::Delete => Some(BulkAction::Delete),
            Self::Create | Self::Rebuild | Self::List => None,
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
