//! In-process metrics: table gauges plus exporter self-metrics.
//!
//! Everything is stored as atomics and rendered by the `/metrics` handler.

pub mod metrics;

pub use metrics::{ExporterMetrics, RefreshStatus, TableSizeGauges, TABLE_SIZE_METRIC};
