//! Snapshot sources: where table sizes come from.
//!
//! A source runs one read per call and owns no state between calls. The
//! refresh loop only sees the trait, so tests plug in fixed snapshots.

pub mod mysql;

use async_trait::async_trait;

use tablesize_core::{Result, Snapshot};

pub use mysql::MySqlSource;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Scope label reported in refresh logs (the configured database name).
    fn scope(&self) -> &str;

    /// Read every (scope, name, size) triple. Fails with `Connection` or
    /// `Query` errors; undecodable rows are counted in `Snapshot::skipped`.
    async fn fetch(&self) -> Result<Snapshot>;
}
