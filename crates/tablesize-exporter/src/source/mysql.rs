//! `information_schema.TABLES` reader.
//!
//! Each fetch opens its own connection, pings it, streams the size query and
//! closes the connection again. Nothing is pooled: a stuck connection is
//! dropped with the cycle that opened it.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Connection, Row};
use tracing::{debug, warn};

use tablesize_core::error::{ExporterError, Result};
use tablesize_core::{MetricSample, Snapshot};

use super::SnapshotSource;
use crate::config::DatabaseConfig;

const DEFAULT_PORT: u16 = 3306;

// Views and empty tables report NULL or 0 and are filtered out.
const TABLE_SIZE_QUERY: &str = r#"
SELECT
    CAST(TABLE_SCHEMA AS CHAR) AS db_name,
    CAST(TABLE_NAME AS CHAR) AS table_name,
    CAST(DATA_LENGTH + INDEX_LENGTH AS UNSIGNED) AS size
FROM information_schema.TABLES
HAVING size > 0
"#;

pub struct MySqlSource {
    cfg: DatabaseConfig,
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl MySqlSource {
    pub fn new(cfg: &DatabaseConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            query_timeout: Duration::from_millis(cfg.query_timeout_ms),
            cfg: cfg.clone(),
        }
    }

    /// Build driver options. Missing settings fail here, at fetch time, so a
    /// half-configured exporter still serves `/metrics`.
    pub fn connect_options(&self) -> Result<MySqlConnectOptions> {
        let (host, port) = parse_host(&self.cfg.host)?;
        if self.cfg.user.is_empty() {
            return Err(ExporterError::Connection("DB_USER is not set".into()));
        }

        let mut opts = MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&self.cfg.user);
        if !self.cfg.password.is_empty() {
            opts = opts.password(&self.cfg.password);
        }
        if !self.cfg.name.is_empty() {
            opts = opts.database(&self.cfg.name);
        }
        Ok(opts)
    }

    async fn connect(&self, opts: &MySqlConnectOptions) -> Result<MySqlConnection> {
        let handshake = async {
            let mut conn = MySqlConnection::connect_with(opts).await?;
            conn.ping().await?;
            Ok::<_, sqlx::Error>(conn)
        };

        match tokio::time::timeout(self.connect_timeout, handshake).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ExporterError::Connection(e.to_string())),
            Err(_) => Err(ExporterError::Connection(format!(
                "connect timed out after {}ms",
                self.connect_timeout.as_millis()
            ))),
        }
    }

    async fn read_sizes(&self, conn: &mut MySqlConnection) -> Result<Snapshot> {
        let read = async {
            let mut rows = sqlx::query(TABLE_SIZE_QUERY).fetch(&mut *conn);
            let mut decoded = Vec::new();
            while let Some(row) = rows.try_next().await? {
                decoded.push(decode_row(&row));
            }
            Ok::<_, sqlx::Error>(decoded)
        };

        let decoded = match tokio::time::timeout(self.query_timeout, read).await {
            Ok(Ok(decoded)) => decoded,
            Ok(Err(e)) => return Err(ExporterError::Query(e.to_string())),
            Err(_) => {
                return Err(ExporterError::Query(format!(
                    "query timed out after {}ms",
                    self.query_timeout.as_millis()
                )))
            }
        };

        Ok(Snapshot::collect(decoded, |e| {
            warn!(error = %e, "skipping catalog row");
        }))
    }
}

#[async_trait]
impl SnapshotSource for MySqlSource {
    fn scope(&self) -> &str {
        &self.cfg.name
    }

    async fn fetch(&self) -> Result<Snapshot> {
        let opts = self.connect_options()?;
        let mut conn = self.connect(&opts).await?;

        let res = self.read_sizes(&mut conn).await;

        // Close regardless of `res`, bounded by the connect timeout.
        match tokio::time::timeout(self.connect_timeout, conn.close()).await {
            Ok(Ok(())) => debug!("catalog connection closed"),
            Ok(Err(e)) => warn!(error = %e, "closing catalog connection failed"),
            Err(_) => warn!("closing catalog connection timed out"),
        }

        res
    }
}

fn decode_row(row: &MySqlRow) -> Result<MetricSample> {
    let scope: String = row
        .try_get("db_name")
        .map_err(|e| ExporterError::RowDecode(format!("db_name: {e}")))?;
    let name: String = row
        .try_get("table_name")
        .map_err(|e| ExporterError::RowDecode(format!("table_name: {e}")))?;
    let size: u64 = row
        .try_get("size")
        .map_err(|e| ExporterError::RowDecode(format!("size of {scope}.{name}: {e}")))?;
    MetricSample::new(scope, name, size as f64)
}

/// Split `host[:port]`; bracketed IPv6 (`[::1]:3307`) and bare IPv6 are
/// accepted.
pub fn parse_host(raw: &str) -> Result<(String, u16)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExporterError::Connection("DB_HOST is not set".into()));
    }

    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ExporterError::Connection(format!("malformed host {raw:?}")))?;
        (host, tail.strip_prefix(':'))
    } else if raw.matches(':').count() > 1 {
        (raw, None)
    } else {
        match raw.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (raw, None),
        }
    };

    if host.is_empty() {
        return Err(ExporterError::Connection(format!("malformed host {raw:?}")));
    }
    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| ExporterError::Connection(format!("invalid port in host {raw:?}")))?,
        None => DEFAULT_PORT,
    };
    Ok((host.to_string(), port))
}
