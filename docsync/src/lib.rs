//! # docsync
//!
//! Command line for managing search indices and the documents in them.
//!
//! This crate provides the process configuration, the wiring of the
//! pipeline components and the `index`, `list`, `document`, `search` and
//! `sync` commands.

pub mod cli;
pub mod config;
pub mod logging;
pub mod manifest;

pub use config::{Dependencies, Settings};

use thiserror::Error;

/// Errors that can occur during startup or while running a command.
#[derive(Error, Debug)]
pub enum DocsyncError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Manifest could not be loaded.
    #[error("Manifest error: {0}")]
    ManifestError(String),

    /// Sync error.
    #[error(transparent)]
    SyncError(#[from] docsync_pipeline::SyncError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] docsync_repository::SearchError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DocsyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a manifest error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::ManifestError(msg.into())
    }
}
