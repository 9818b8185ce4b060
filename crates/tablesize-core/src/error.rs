//! Shared error type across tablesize crates.

use serde::Serialize;
use thiserror::Error;

/// Stable error kind codes (logged and reported on `/status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Data source unreachable or handshake failed.
    Connection,
    /// Query failed or timed out.
    Query,
    /// A single row could not be interpreted.
    RowDecode,
    /// Invalid configuration.
    Config,
    /// Scrape endpoint could not bind.
    ListenerBind,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "CONNECTION",
            ErrorKind::Query => "QUERY",
            ErrorKind::RowDecode => "ROW_DECODE",
            ErrorKind::Config => "CONFIG",
            ErrorKind::ListenerBind => "LISTENER_BIND",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Unified error type used by core and exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("row decode failed: {0}")]
    RowDecode(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("listener bind failed: {0}")]
    ListenerBind(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ExporterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExporterError::Connection(_) => ErrorKind::Connection,
            ExporterError::Query(_) => ErrorKind::Query,
            ExporterError::RowDecode(_) => ErrorKind::RowDecode,
            ExporterError::Config(_) => ErrorKind::Config,
            ExporterError::ListenerBind(_) => ErrorKind::ListenerBind,
            ExporterError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Per-cycle errors: the refresh loop logs them and carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExporterError::Connection(_) | ExporterError::Query(_) | ExporterError::RowDecode(_)
        )
    }
}
