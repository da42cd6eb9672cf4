//! Process configuration and dependency wiring.

pub mod dependencies;
pub mod settings;

pub use dependencies::{DeferredWorker, Dependencies};
pub use settings::{ProcessorKind, Settings};
