//! Named backend connections.
//!
//! Documents may target a named connection; everything else uses the
//! `default` connection, which must always be configured.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{ConnectionConfig, DEFAULT_CONNECTION};
use crate::errors::SearchError;
use crate::interfaces::SearchBackend;
use crate::opensearch::OpenSearchBackend;

/// Process-wide set of named backends, read-only after startup.
#[derive(Clone)]
pub struct Connections {
    backends: BTreeMap<String, Arc<dyn SearchBackend>>,
}

impl Connections {
    /// Create a set holding only the `default` backend.
    pub fn single(backend: Arc<dyn SearchBackend>) -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(DEFAULT_CONNECTION.to_string(), backend);
        Self { backends }
    }

    /// Build OpenSearch backends for every configured connection.
    ///
    /// # Returns
    ///
    /// * `Ok(Connections)` - If every backend could be built
    /// * `Err(SearchError::ConfigurationError)` - If no `default` connection
    ///   is configured, a name is repeated, or a backend cannot be built
    pub fn from_configs(configs: &[ConnectionConfig]) -> Result<Self, SearchError> {
        let mut backends: BTreeMap<String, Arc<dyn SearchBackend>> = BTreeMap::new();

        for config in configs {
            if backends.contains_key(&config.name) {
                return Err(SearchError::configuration(format!(
                    "connection '{}' is configured twice",
                    config.name
                )));
            }
            let backend = OpenSearchBackend::new(config)?;
            backends.insert(config.name.clone(), Arc::new(backend));
        }

        if !backends.contains_key(DEFAULT_CONNECTION) {
            return Err(SearchError::configuration(
                "a 'default' connection is required",
            ));
        }

        Ok(Self { backends })
    }

    /// Add or replace a named backend.
    pub fn with_backend(mut self, name: impl Into<String>, backend: Arc<dyn SearchBackend>) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    /// Backend for a connection name, `default` when `name` is `None`.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn SearchBackend>, SearchError> {
        let name = name.unwrap_or(DEFAULT_CONNECTION);
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| SearchError::configuration(format!("unknown connection '{}'", name)))
    }

    /// The `default` backend.
    pub fn default_backend(&self) -> Result<Arc<dyn SearchBackend>, SearchError> {
        self.get(None)
    }

    /// Configured connection names.
    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}
