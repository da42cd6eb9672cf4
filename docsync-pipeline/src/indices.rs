//! Versioned indices.
//!
//! A version of index `name` is a concrete index named
//! `name--<suffix>`. The active version is the one the alias `name` points
//! at; when no version is aliased, a concrete index called `name` is the
//! active one. Switching versions is a single atomic alias update.

use std::sync::Arc;

use chrono::Utc;
use docsync_repository::{AliasAction, SearchBackend};
use tracing::info;

use crate::errors::SyncError;

pub const VERSION_NAME_SEPARATOR: &str = "--";

pub fn version_name(index: &str, suffix: &str) -> String {
    format!("{}{}{}", index, VERSION_NAME_SEPARATOR, suffix)
}

/// Suffix of a new version when none is given: the current time down to
/// microseconds.
pub fn default_suffix() -> String {
    Utc::now().format("%Y%m%d%H%M%S%6f").to_string()
}

/// Version operations for the indices of one connection.
#[derive(Clone)]
pub struct IndexVersions {
    backend: Arc<dyn SearchBackend>,
}

impl IndexVersions {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Versions of `index`, sorted by name.
    pub async fn versions(&self, index: &str) -> Result<Vec<String>, SyncError> {
        let pattern = format!("{}{}*", index, VERSION_NAME_SEPARATOR);
        let mut versions = self.backend.list_indices(&pattern).await?;
        versions.sort();
        Ok(versions)
    }

    /// # Returns
    ///
    /// * `Err(SyncError::NotFound)` - If `version` is not a version of `index`
    pub async fn version(&self, index: &str, version: &str) -> Result<String, SyncError> {
        self.versions(index)
            .await?
            .into_iter()
            .find(|name| name == version)
            .ok_or_else(|| {
                SyncError::not_found(format!(
                    "index version '{}' not found for index '{}'",
                    version, index
                ))
            })
    }

    /// The concrete index currently serving `index`, if any.
    pub async fn active_version(&self, index: &str) -> Result<Option<String>, SyncError> {
        for version in self.versions(index).await? {
            if self.backend.alias_exists(&version, index).await? {
                return Ok(Some(version));
            }
        }
        if self.backend.index_exists(index).await? {
            return Ok(Some(index.to_string()));
        }
        Ok(None)
    }

    /// Point the alias `index` at `version`, detaching it from the previous
    /// active version in the same step.
    ///
    /// A concrete index named `index` is dropped in that step, so that the
    /// name becomes free for the alias.
    pub async fn activate_version(&self, index: &str, version: &str) -> Result<(), SyncError> {
        let version = self.version(index, version).await?;

        let mut actions = Vec::new();
        match self.active_version(index).await? {
            Some(active) if active == index => actions.push(AliasAction::RemoveIndex {
                index: active,
            }),
            Some(active) => actions.push(AliasAction::Remove {
                index: active,
                alias: index.to_string(),
            }),
            None => {}
        }
        actions.push(AliasAction::Add {
            index: version.clone(),
            alias: index.to_string(),
        });

        self.backend.update_aliases(&actions).await?;
        info!(index, version = %version, "Activated index version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use serde_json::json;

    #[test]
    fn test_version_name() {
        assert_eq!(version_name("country", "v2"), "country--v2");
        let suffix = default_suffix();
        assert_eq!(suffix.len(), 20);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_versions_sorted_and_scoped() {
        let backend = MockBackend::new()
            .with_index("country--b")
            .with_index("country--a")
            .with_index("countryside--a")
            .with_index("continent--a");
        let versions = IndexVersions::new(backend);

        assert_eq!(
            versions.versions("country").await.unwrap(),
            vec!["country--a", "country--b"]
        );
        assert!(versions.version("country", "country--c").await.is_err());
    }

    #[tokio::test]
    async fn test_create_and_activate() {
        let backend = MockBackend::new();
        let versions = IndexVersions::new(backend.clone());

        assert_eq!(versions.active_version("country").await.unwrap(), None);

        let first = version_name("country", "v1");
        backend.create_index(&first, &json!({})).await.unwrap();
        assert_eq!(versions.active_version("country").await.unwrap(), None);

        versions.activate_version("country", &first).await.unwrap();
        assert_eq!(
            versions.active_version("country").await.unwrap(),
            Some(first.clone())
        );

        let second = version_name("country", "v2");
        backend.create_index(&second, &json!({})).await.unwrap();
        versions.activate_version("country", &second).await.unwrap();

        assert_eq!(
            versions.active_version("country").await.unwrap(),
            Some(second.clone())
        );
        let last_call = backend.snapshot().alias_calls.last().cloned().unwrap();
        assert_eq!(
            last_call,
            vec![
                AliasAction::Remove {
                    index: first,
                    alias: "country".into()
                },
                AliasAction::Add {
                    index: second,
                    alias: "country".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_activate_replaces_concrete_index() {
        let backend = MockBackend::new().with_index("country");
        let versions = IndexVersions::new(backend.clone());

        assert_eq!(
            versions.active_version("country").await.unwrap(),
            Some("country".to_string())
        );

        let version = version_name("country", "v1");
        backend.create_index(&version, &json!({})).await.unwrap();
        versions.activate_version("country", &version).await.unwrap();

        assert_eq!(
            versions.active_version("country").await.unwrap(),
            Some(version)
        );
        assert!(!backend.snapshot().indices.contains_key("country"));
    }

    #[tokio::test]
    async fn test_activate_unknown_version() {
        let backend = MockBackend::new();
        let versions = IndexVersions::new(backend);

        let err = versions
            .activate_version("country", "country--missing")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }
}
