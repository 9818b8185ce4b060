use serde::{Deserialize, Serialize};
use tablesize_core::error::{ExporterError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    #[serde(default)]
    pub exporter: ExporterSection,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            version: 1,
            exporter: ExporterSection::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ExporterError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.exporter.validate()?;
        self.database.validate(self.exporter.interval_ms)?;
        Ok(())
    }
}

/// What happens to gauges for tables missing from a successful snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Keep reporting the last known size.
    #[default]
    Retain,
    /// Drop the gauge (skipped when the snapshot is empty).
    Prune,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub stale_policy: StalePolicy,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            interval_ms: default_interval_ms(),
            stale_policy: StalePolicy::default(),
        }
    }
}

impl ExporterSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=86_400_000).contains(&self.interval_ms) {
            return Err(ExporterError::Config(
                "exporter.interval_ms must be between 1000 and 86400000".into(),
            ));
        }
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ExporterError::Config(format!(
                "exporter.listen must be a socket address, got {:?}",
                self.listen
            )));
        }
        Ok(())
    }
}

/// Connection settings. Credentials are usually injected from the
/// environment; missing values only surface when a refresh connects.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// `host` or `host:port`.
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
            name: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("name", &self.name)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn validate(&self, interval_ms: u64) -> Result<()> {
        if self.connect_timeout_ms == 0 || self.query_timeout_ms == 0 {
            return Err(ExporterError::Config(
                "database timeouts must be greater than zero".into(),
            ));
        }
        if self.connect_timeout_ms.saturating_add(self.query_timeout_ms) > interval_ms {
            return Err(ExporterError::Config(
                "database.connect_timeout_ms + query_timeout_ms must not exceed exporter.interval_ms"
                    .into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:9100".into()
}
fn default_interval_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_query_timeout_ms() -> u64 {
    10_000
}
