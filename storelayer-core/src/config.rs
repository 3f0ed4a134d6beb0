//! Connection configuration.
//!
//! [`ConnectionSettings`] carries the options every backend family
//! understands (host, port, protocol, credentials, database) plus a free-form
//! map of backend-specific transport options. Settings can be built
//! fluently or deserialized from JSON.
//!
//! ```ignore
//! use storelayer_core::config::ConnectionSettings;
//!
//! let settings = ConnectionSettings::builder()
//!     .host("127.0.0.1")
//!     .port(5984)
//!     .database("widgets")
//!     .build();
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreResult;

/// Settings used to establish a backend connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    /// Full connection string. Takes precedence over host/port/protocol.
    pub url: Option<String>,
    /// Database or namespace name. `db` is accepted as an alias.
    #[serde(alias = "db")]
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Backend-specific transport options.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ConnectionSettings {
    pub fn builder() -> ConnectionSettingsBuilder {
        ConnectionSettingsBuilder::default()
    }

    /// Parses settings from a JSON value.
    pub fn from_json(value: Value) -> StoreResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the configured database name, ignoring empty strings.
    pub fn database(&self) -> Option<&str> {
        self.database
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Returns a backend-specific option.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Renders `protocol://host:port` from the individual settings, using the
    /// given defaults for anything not configured. `url` wins when set.
    pub fn url_or(&self, protocol: &str, host: &str, port: u16) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        format!(
            "{}://{}:{}",
            self.protocol.as_deref().unwrap_or(protocol),
            self.host.as_deref().unwrap_or(host),
            self.port.unwrap_or(port),
        )
    }
}

/// Fluent builder for [`ConnectionSettings`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettingsBuilder {
    settings: ConnectionSettings,
}

impl ConnectionSettingsBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = Some(port);
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.settings.protocol = Some(protocol.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.settings.url = Some(url.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.settings.database = Some(database.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.settings.username = Some(username.into());
        self.settings.password = Some(password.into());
        self
    }

    /// Adds a backend-specific option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.options.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ConnectionSettings {
        self.settings
    }
}
