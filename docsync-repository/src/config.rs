//! Connection configuration for the search backend.

use std::time::Duration;

/// Name of the connection used when none is given.
pub const DEFAULT_CONNECTION: &str = "default";

/// Default transport timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of one named backend connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Connection name, `default` for the connection used by default.
    pub name: String,
    /// Backend URL (e.g. "http://localhost:9200").
    pub url: String,
    /// Basic auth user name.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Transport timeout for every request.
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Create a config with the given name and URL.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create the `default` connection config.
    pub fn default_connection(url: impl Into<String>) -> Self {
        Self::new(DEFAULT_CONNECTION, url)
    }

    /// Set basic auth credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
