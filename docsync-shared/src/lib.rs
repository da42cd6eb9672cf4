//! # docsync shared types
//!
//! Types shared by every docsync crate: source records and their primary
//! keys, the bulk and command actions, and the `key=value` lookup grammar used
//! to filter record sources.

pub mod action;
pub mod lookup;
pub mod record;

pub use action::{BulkAction, CommandAction};
pub use lookup::{parse_value, FilterValue, Lookup, LookupError, LookupOp};
pub use record::{ModelName, PrimaryKey, Record, Related};
