//! Process settings read from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use docsync_pipeline::{PipelineConfig, RetryPolicy};
use docsync_repository::config::DEFAULT_CONNECTION;
use docsync_repository::ConnectionConfig;
use serde_json::Value;

use crate::DocsyncError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default manifest path.
const DEFAULT_MANIFEST: &str = "docsync.json";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How mutation events are synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessorKind {
    /// Before the event handler returns.
    #[default]
    RealTime,
    /// Later, by a task worker.
    Deferred,
}

impl FromStr for ProcessorKind {
    type Err = DocsyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "realtime" | "real_time" | "real-time" => Ok(Self::RealTime),
            "deferred" => Ok(Self::Deferred),
            other => Err(DocsyncError::config(format!(
                "unknown signal processor '{}', expected 'realtime' or 'deferred'",
                other
            ))),
        }
    }
}

/// Everything the process reads from its environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// The `default` connection first, then the named ones.
    pub connections: Vec<ConnectionConfig>,
    pub pipeline: PipelineConfig,
    pub autosync: bool,
    pub signal_processor: ProcessorKind,
    /// Settings every index is created with, before its own.
    pub index_settings: Value,
    pub manifest: PathBuf,
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: default connection (default: http://localhost:9200)
    /// - `OPENSEARCH_CONNECTIONS`: extra connections as `name=url,...`
    /// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: basic auth
    /// - `OPENSEARCH_TIMEOUT_SECS`: transport timeout (default: 30)
    /// - `DOCSYNC_QUERYSET_PAGINATION`: records per chunk (default: 4096)
    /// - `DOCSYNC_AUTO_REFRESH`: refresh after writes (default: false)
    /// - `DOCSYNC_PARALLEL`: parallel bulk by default (default: false)
    /// - `DOCSYNC_PARALLEL_WORKERS`: chunks in flight (default: 4)
    /// - `DOCSYNC_AUTOSYNC`: sync mutation events (default: true)
    /// - `DOCSYNC_SIGNAL_PROCESSOR`: `realtime` or `deferred`
    /// - `DOCSYNC_INDEX_SETTINGS`: JSON default index settings (default: {})
    /// - `DOCSYNC_MAX_RETRIES`: transient failure retries (default: 3)
    /// - `DOCSYNC_MANIFEST`: document manifest (default: docsync.json)
    pub fn from_env() -> Result<Self, DocsyncError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`; unset and empty values use defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DocsyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let timeout = Duration::from_secs(parse_or(&get, "OPENSEARCH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?);
        let credentials = match (get("OPENSEARCH_USERNAME"), get("OPENSEARCH_PASSWORD")) {
            (Some(username), Some(password)) => Some((username, password)),
            (None, None) => None,
            _ => {
                return Err(DocsyncError::config(
                    "OPENSEARCH_USERNAME and OPENSEARCH_PASSWORD must be set together",
                ))
            }
        };

        let mut connections = vec![ConnectionConfig::default_connection(
            get("OPENSEARCH_URL").unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
        )];
        if let Some(extra) = get("OPENSEARCH_CONNECTIONS") {
            connections.extend(parse_connections(&extra)?);
        }
        let connections = connections
            .into_iter()
            .map(|config| {
                let config = config.with_timeout(timeout);
                match &credentials {
                    Some((username, password)) => config.with_credentials(username, password),
                    None => config,
                }
            })
            .collect();

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            chunk_size: parse_or(&get, "DOCSYNC_QUERYSET_PAGINATION", defaults.chunk_size)?,
            auto_refresh: parse_bool_or(&get, "DOCSYNC_AUTO_REFRESH", defaults.auto_refresh)?,
            parallel: parse_bool_or(&get, "DOCSYNC_PARALLEL", defaults.parallel)?,
            workers: parse_or(&get, "DOCSYNC_PARALLEL_WORKERS", defaults.workers)?,
            retry: RetryPolicy {
                max_retries: parse_or(&get, "DOCSYNC_MAX_RETRIES", defaults.retry.max_retries)?,
                ..defaults.retry
            },
        };
        if pipeline.chunk_size == 0 {
            return Err(DocsyncError::config("DOCSYNC_QUERYSET_PAGINATION must be positive"));
        }
        if pipeline.workers == 0 {
            return Err(DocsyncError::config("DOCSYNC_PARALLEL_WORKERS must be positive"));
        }

        let index_settings = match get("DOCSYNC_INDEX_SETTINGS") {
            Some(raw) => {
                let value: Value = serde_json::from_str(&raw).map_err(|e| {
                    DocsyncError::config(format!("DOCSYNC_INDEX_SETTINGS is not valid JSON: {}", e))
                })?;
                if !value.is_object() {
                    return Err(DocsyncError::config("DOCSYNC_INDEX_SETTINGS must be a JSON object"));
                }
                value
            }
            None => Value::Object(Default::default()),
        };

        Ok(Self {
            connections,
            pipeline,
            autosync: parse_bool_or(&get, "DOCSYNC_AUTOSYNC", true)?,
            signal_processor: match get("DOCSYNC_SIGNAL_PROCESSOR") {
                Some(raw) => raw.parse()?,
                None => ProcessorKind::default(),
            },
            index_settings,
            manifest: PathBuf::from(get("DOCSYNC_MANIFEST").unwrap_or_else(|| DEFAULT_MANIFEST.to_string())),
        })
    }
}

/// Parse `name=url,name=url`.
fn parse_connections(raw: &str) -> Result<Vec<ConnectionConfig>, DocsyncError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry.split_once('=').ok_or_else(|| {
                DocsyncError::config(format!(
                    "invalid connection '{}' in OPENSEARCH_CONNECTIONS, expected name=url",
                    entry
                ))
            })?;
            let name = name.trim();
            if name.is_empty() || name == DEFAULT_CONNECTION {
                return Err(DocsyncError::config(format!(
                    "invalid connection name '{}' in OPENSEARCH_CONNECTIONS",
                    name
                )));
            }
            Ok(ConnectionConfig::new(name, url.trim()))
        })
        .collect()
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T, DocsyncError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DocsyncError::config(format!("invalid {}: '{}' ({})", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool, DocsyncError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(DocsyncError::config(format!(
                "invalid {}: '{}', expected true or false",
                key, raw
            ))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, DocsyncError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();

        assert_eq!(settings.connections.len(), 1);
        assert_eq!(settings.connections[0].name, DEFAULT_CONNECTION);
        assert_eq!(settings.connections[0].url, DEFAULT_OPENSEARCH_URL);
        assert_eq!(settings.connections[0].timeout, Duration::from_secs(30));
        assert_eq!(settings.pipeline.chunk_size, 4096);
        assert!(!settings.pipeline.auto_refresh);
        assert!(!settings.pipeline.parallel);
        assert_eq!(settings.pipeline.workers, 4);
        assert_eq!(settings.pipeline.retry.max_retries, 3);
        assert!(settings.autosync);
        assert_eq!(settings.signal_processor, ProcessorKind::RealTime);
        assert_eq!(settings.index_settings, json!({}));
        assert_eq!(settings.manifest, PathBuf::from("docsync.json"));
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("OPENSEARCH_URL", "http://search:9200"),
            ("OPENSEARCH_CONNECTIONS", "archive=http://archive:9200, reporting=http://reporting:9200"),
            ("OPENSEARCH_USERNAME", "admin"),
            ("OPENSEARCH_PASSWORD", "secret"),
            ("OPENSEARCH_TIMEOUT_SECS", "5"),
            ("DOCSYNC_QUERYSET_PAGINATION", "500"),
            ("DOCSYNC_AUTO_REFRESH", "true"),
            ("DOCSYNC_PARALLEL", "1"),
            ("DOCSYNC_PARALLEL_WORKERS", "8"),
            ("DOCSYNC_AUTOSYNC", "off"),
            ("DOCSYNC_SIGNAL_PROCESSOR", "deferred"),
            ("DOCSYNC_INDEX_SETTINGS", r#"{"number_of_shards": 2}"#),
            ("DOCSYNC_MAX_RETRIES", "0"),
            ("DOCSYNC_MANIFEST", "/etc/docsync/manifest.json"),
        ])
        .unwrap();

        let names: Vec<&str> = settings.connections.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["default", "archive", "reporting"]);
        assert_eq!(settings.connections[1].url, "http://archive:9200");
        assert!(settings
            .connections
            .iter()
            .all(|c| c.username.as_deref() == Some("admin") && c.timeout == Duration::from_secs(5)));
        assert_eq!(settings.pipeline.chunk_size, 500);
        assert!(settings.pipeline.auto_refresh);
        assert!(settings.pipeline.parallel);
        assert_eq!(settings.pipeline.workers, 8);
        assert_eq!(settings.pipeline.retry.max_retries, 0);
        assert!(!settings.autosync);
        assert_eq!(settings.signal_processor, ProcessorKind::Deferred);
        assert_eq!(settings.index_settings, json!({"number_of_shards": 2}));
    }

    #[test]
    fn test_invalid_values() {
        assert!(settings(&[("DOCSYNC_PARALLEL", "maybe")]).is_err());
        assert!(settings(&[("DOCSYNC_QUERYSET_PAGINATION", "lots")]).is_err());
        assert!(settings(&[("DOCSYNC_QUERYSET_PAGINATION", "0")]).is_err());
        assert!(settings(&[("DOCSYNC_SIGNAL_PROCESSOR", "celery")]).is_err());
        assert!(settings(&[("DOCSYNC_INDEX_SETTINGS", "[1, 2]")]).is_err());
        assert!(settings(&[("OPENSEARCH_CONNECTIONS", "archive")]).is_err());
        assert!(settings(&[("OPENSEARCH_CONNECTIONS", "default=http://other:9200")]).is_err());
        assert!(settings(&[("OPENSEARCH_USERNAME", "admin")]).is_err());
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let settings = settings(&[("OPENSEARCH_URL", ""), ("DOCSYNC_PARALLEL_WORKERS", " ")]).unwrap();
        assert_eq!(settings.connections[0].url, DEFAULT_OPENSEARCH_URL);
        assert_eq!(settings.pipeline.workers, 4);
    }
}
