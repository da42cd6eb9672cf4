//! # docsync pipeline
//!
//! Keeps search indices in sync with the records of a host application.
//!
//! ## Architecture
//!
//! 1. **Registry**: Maps models to the documents that index them
//! 2. **Documents**: Turn source records into index documents
//! 3. **Pipeline**: Streams records from a source into the backend in chunks
//! 4. **Sync**: Reacts to record mutations, in real time or through a task queue
//! 5. **Management**: Index lifecycle, versioned indices and bulk commands
//! 6. **Search**: Queries a document's index and maps hits back to records

pub mod document;
pub mod errors;
pub mod indices;
pub mod management;
pub mod paginator;
pub mod pipeline;
pub mod registry;
pub mod search;
pub mod source;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use document::{
    Document, DocumentDefinition, FieldSpec, IndexSpec, ModelDocument, PrepareContext,
    RelatedModel,
};
pub use errors::{ErrorKind, SyncError};
pub use indices::IndexVersions;
pub use management::{DocumentCommand, DocumentManager, IndexCommand, IndexManager};
pub use paginator::BatchType;
pub use pipeline::{BulkOptions, BulkPipeline, BulkReport, PipelineConfig, RetryPolicy};
pub use registry::DocumentRegistry;
pub use search::DocumentSearch;
pub use source::{MemorySource, RecordQuery, RecordSource};
pub use sync::{IndexSync, MutationEvent, SignalProcessor};
