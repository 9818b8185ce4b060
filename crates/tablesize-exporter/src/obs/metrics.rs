//! Metrics registry for the exporter.
//!
//! Table gauges live in a `DashMap` keyed by `GaugeKey`, each value an
//! `AtomicU64` holding `f64` bits, so a single `set` is atomic and readers
//! never see a torn value. Rendering walks a sorted copy for deterministic
//! output. Exporter self-metrics sit next to the table gauges and are
//! rendered after them.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use tablesize_core::exposition::{write_header, write_sample, MetricKind};
use tablesize_core::{ErrorKind, GaugeKey};

/// Metric name for per-table storage size.
pub const TABLE_SIZE_METRIC: &str = "mysql_table_storage_bytes";
const TABLE_SIZE_HELP: &str = "The size of the MySQL table in bytes (Data_length + Index_length).";

const SELF_PREFIX: &str = "mysql_table_storage_exporter";

/// An `f64` stored as bits in an atomic.
#[derive(Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }
    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Release);
    }
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// Last-known storage size per (table, database).
#[derive(Default)]
pub struct TableSizeGauges {
    map: DashMap<GaugeKey, AtomicF64>,
}

impl TableSizeGauges {
    /// Upsert; last write wins.
    pub fn set(&self, key: GaugeKey, value: f64) {
        if let Some(cell) = self.map.get(&key) {
            cell.store(value);
            return;
        }
        self.map
            .entry(key)
            .and_modify(|cell| cell.store(value))
            .or_insert_with(|| AtomicF64::new(value));
    }

    pub fn get(&self, key: &GaugeKey) -> Option<f64> {
        self.map.get(key).map(|cell| cell.load())
    }

    /// Point-in-time copy of every gauge.
    pub fn snapshot_all(&self) -> BTreeMap<GaugeKey, f64> {
        self.map
            .iter()
            .map(|r| (r.key().clone(), r.value().load()))
            .collect()
    }

    /// Drop every gauge whose key is not in `keep`. Returns how many went.
    pub fn retain_only(&self, keep: &HashSet<GaugeKey>) -> usize {
        let before = self.map.len();
        self.map.retain(|k, _| keep.contains(k));
        before.saturating_sub(self.map.len())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn render(&self, out: &mut String) {
        write_header(out, TABLE_SIZE_METRIC, TABLE_SIZE_HELP, MetricKind::Gauge);
        for (key, value) in self.snapshot_all() {
            write_sample(
                out,
                TABLE_SIZE_METRIC,
                &[("table_name", key.name.as_str()), ("database_name", key.scope.as_str())],
                value,
            );
        }
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(Self::key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&Self::key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut key: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();
        key
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        write_header(out, name, help, MetricKind::Counter);
        let mut rows: Vec<(Vec<(String, String)>, u64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (key, val) in rows {
            let labels: Vec<(&str, &str)> =
                key.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            write_sample(out, name, &labels, val as f64);
        }
    }
}

/// Exporter self-observation, served as JSON on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub up: bool,
    pub ready: bool,
    pub draining: bool,
    pub tracked_tables: usize,
    pub last_success_unix: Option<f64>,
    pub last_duration_secs: f64,
    pub last_error: Option<ErrorKind>,
    pub successes: u64,
    pub failures: u64,
    pub rows_skipped: u64,
}

pub struct ExporterMetrics {
    tables: TableSizeGauges,
    refreshes: CounterVec,
    rows_skipped: AtomicU64,
    up: AtomicBool,
    ready: AtomicBool,
    last_success_unix: AtomicF64,
    last_duration_secs: AtomicF64,
    last_error: RwLock<Option<ErrorKind>>,
    draining: AtomicBool,
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    pub fn new() -> Self {
        Self {
            tables: TableSizeGauges::default(),
            refreshes: CounterVec::default(),
            rows_skipped: AtomicU64::new(0),
            up: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            last_success_unix: AtomicF64::new(0.0),
            last_duration_secs: AtomicF64::new(0.0),
            last_error: RwLock::new(None),
            draining: AtomicBool::new(false),
        }
    }

    pub fn tables(&self) -> &TableSizeGauges {
        &self.tables
    }

    pub fn record_success(&self, duration: Duration, skipped: usize, now_unix: f64) {
        self.refreshes.inc(&[("outcome", "success")]);
        self.rows_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
        self.last_duration_secs.store(duration.as_secs_f64());
        self.last_success_unix.store(now_unix);
        *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.up.store(true, Ordering::Release);
        self.ready.store(true, Ordering::Release);
    }

    pub fn record_failure(&self, kind: ErrorKind, duration: Duration) {
        let outcome = kind.as_str().to_ascii_lowercase();
        self.refreshes.inc(&[("outcome", outcome.as_str())]);
        self.last_duration_secs.store(duration.as_secs_f64());
        *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = Some(kind);
        self.up.store(false, Ordering::Release);
    }

    /// Whether the most recent refresh succeeded.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Whether any refresh has succeeded since startup.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn refreshes(&self, outcome: &str) -> u64 {
        self.refreshes.get(&[("outcome", outcome)])
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped.load(Ordering::Relaxed)
    }

    /// Mark draining state.
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }
    /// Return whether draining is active.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> RefreshStatus {
        let successes = self.refreshes("success");
        let total: u64 = self
            .refreshes
            .map
            .iter()
            .map(|r| r.value().load(Ordering::Relaxed))
            .sum();
        RefreshStatus {
            up: self.is_up(),
            ready: self.is_ready(),
            draining: self.is_draining(),
            tracked_tables: self.tables.len(),
            last_success_unix: self.is_ready().then(|| self.last_success_unix.load()),
            last_duration_secs: self.last_duration_secs.load(),
            last_error: *self.last_error.read().unwrap_or_else(|e| e.into_inner()),
            successes,
            failures: total.saturating_sub(successes),
            rows_skipped: self.rows_skipped(),
        }
    }

    /// Render the full scrape body.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.tables.render(&mut out);

        let up = format!("{SELF_PREFIX}_up");
        write_header(&mut out, &up, "Whether the last refresh succeeded.", MetricKind::Gauge);
        write_sample(&mut out, &up, &[], if self.is_up() { 1.0 } else { 0.0 });

        let last = format!("{SELF_PREFIX}_last_success_timestamp_seconds");
        write_header(
            &mut out,
            &last,
            "Unix time of the last successful refresh.",
            MetricKind::Gauge,
        );
        write_sample(&mut out, &last, &[], self.last_success_unix.load());

        let dur = format!("{SELF_PREFIX}_refresh_duration_seconds");
        write_header(&mut out, &dur, "Duration of the last refresh cycle.", MetricKind::Gauge);
        write_sample(&mut out, &dur, &[], self.last_duration_secs.load());

        self.refreshes.render(
            &format!("{SELF_PREFIX}_refreshes_total"),
            "Refresh cycles by outcome.",
            &mut out,
        );

        let skipped = format!("{SELF_PREFIX}_rows_skipped_total");
        write_header(&mut out, &skipped, "Catalog rows that failed to decode.", MetricKind::Counter);
        write_sample(&mut out, &skipped, &[], self.rows_skipped() as f64);

        let tracked = format!("{SELF_PREFIX}_tables");
        write_header(&mut out, &tracked, "Number of tracked table gauges.", MetricKind::Gauge);
        write_sample(&mut out, &tracked, &[], self.tables.len() as f64);

        let draining = format!("{SELF_PREFIX}_draining");
        write_header(&mut out, &draining, "Whether the exporter is shutting down.", MetricKind::Gauge);
        write_sample(&mut out, &draining, &[], if self.is_draining() { 1.0 } else { 0.0 });

        out
    }
}
