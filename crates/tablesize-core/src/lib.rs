//! tablesize core: storage readings, the shared error type, and the text
//! exposition writer.
//!
//! This crate carries no runtime, database, or HTTP dependencies so the same
//! types can back the exporter binary, tests, and alternative sources.
//!
//! Panics, `unwrap`, and `expect` are compile-denied here; every fallible path
//! surfaces as `ExporterError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod exposition;
pub mod sample;

/// Shared result type.
pub use error::{ErrorKind, ExporterError, Result};
pub use sample::{GaugeKey, MetricSample, Snapshot};
