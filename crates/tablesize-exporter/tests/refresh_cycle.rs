//! Refresh loop behaviour against scripted snapshot sources.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use tablesize_core::{ErrorKind, ExporterError, GaugeKey, MetricSample, Result, Snapshot};
use tablesize_exporter::config::StalePolicy;
use tablesize_exporter::obs::ExporterMetrics;
use tablesize_exporter::refresh::Refresher;
use tablesize_exporter::source::SnapshotSource;

/// Hands out queued results in order; an empty queue yields empty snapshots.
struct ScriptedSource {
    script: Mutex<VecDeque<Result<Snapshot>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Snapshot>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    fn scope(&self) -> &str {
        "app"
    }

    async fn fetch(&self) -> Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Snapshot::default()))
    }
}

/// Sleeps inside every fetch and tracks how many fetches overlap.
struct SlowSource {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl SnapshotSource for SlowSource {
    fn scope(&self) -> &str {
        "app"
    }

    async fn fetch(&self) -> Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Snapshot::default())
    }
}

fn snap(rows: &[(&str, &str, f64)]) -> Snapshot {
    Snapshot {
        samples: rows
            .iter()
            .map(|(scope, name, v)| MetricSample::new(*scope, *name, *v).unwrap())
            .collect(),
        skipped: 0,
    }
}

fn refresher(source: Arc<dyn SnapshotSource>, policy: StalePolicy) -> (Refresher, Arc<ExporterMetrics>) {
    let metrics = Arc::new(ExporterMetrics::new());
    let r = Refresher::new(source, Arc::clone(&metrics), Duration::from_secs(30), policy);
    (r, metrics)
}

#[tokio::test]
async fn cycle_applies_every_sample() {
    let source = ScriptedSource::new(vec![Ok(snap(&[
        ("app", "users", 1024.0),
        ("app", "orders", 2048.0),
    ]))]);
    let (r, metrics) = refresher(source, StalePolicy::Retain);

    let report = r.run_cycle().await.unwrap();
    assert_eq!(report.updated, 2);
    assert_eq!(report.skipped, 0);

    let all = metrics.tables().snapshot_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[&GaugeKey::new("users", "app")], 1024.0);
    assert_eq!(all[&GaugeKey::new("orders", "app")], 2048.0);
    assert!(metrics.is_up());
}

#[tokio::test]
async fn failed_fetch_leaves_registry_untouched() {
    let source = ScriptedSource::new(vec![
        Ok(snap(&[("app", "users", 1024.0)])),
        Err(ExporterError::Connection("connection refused".into())),
        Err(ExporterError::Query("query timed out after 10000ms".into())),
    ]);
    let (r, metrics) = refresher(source, StalePolicy::Prune);

    r.run_cycle().await.unwrap();
    let before = metrics.tables().snapshot_all();

    let err = r.run_cycle().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    let err = r.run_cycle().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);

    assert_eq!(metrics.tables().snapshot_all(), before);
    assert!(!metrics.is_up());
    assert!(metrics.is_ready());
    assert_eq!(metrics.refreshes("connection"), 1);
    assert_eq!(metrics.refreshes("query"), 1);
}

#[tokio::test]
async fn empty_snapshot_does_not_clear() {
    for policy in [StalePolicy::Retain, StalePolicy::Prune] {
        let source = ScriptedSource::new(vec![
            Ok(snap(&[("app", "users", 1024.0)])),
            Ok(Snapshot::default()),
        ]);
        let (r, metrics) = refresher(source, policy);

        r.run_cycle().await.unwrap();
        let report = r.run_cycle().await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.pruned, 0);
        assert_eq!(metrics.tables().get(&GaugeKey::new("users", "app")), Some(1024.0));
    }
}

#[tokio::test]
async fn skipped_rows_do_not_end_the_cycle() {
    let rows = vec![
        MetricSample::new("app", "users", 1024.0),
        Err(ExporterError::RowDecode("size of app.broken: invalid utf-8".into())),
        MetricSample::new("app", "orders", 2048.0),
    ];
    let source = ScriptedSource::new(vec![Ok(Snapshot::collect(rows, |_| {}))]);
    let (r, metrics) = refresher(source, StalePolicy::Retain);

    let report = r.run_cycle().await.unwrap();
    assert_eq!(report.updated, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(metrics.tables().len(), 2);
    assert_eq!(metrics.rows_skipped(), 1);
}

#[tokio::test]
async fn stale_tables_are_retained_by_default() {
    let source = ScriptedSource::new(vec![
        Ok(snap(&[("app", "users", 1.0), ("app", "dropped", 2.0)])),
        Ok(snap(&[("app", "users", 3.0)])),
    ]);
    let (r, metrics) = refresher(source, StalePolicy::Retain);
    r.run_cycle().await.unwrap();
    r.run_cycle().await.unwrap();

    assert_eq!(metrics.tables().get(&GaugeKey::new("users", "app")), Some(3.0));
    assert_eq!(metrics.tables().get(&GaugeKey::new("dropped", "app")), Some(2.0));
}

#[tokio::test]
async fn prune_policy_drops_vanished_tables() {
    let source = ScriptedSource::new(vec![
        Ok(snap(&[("app", "users", 1.0), ("app", "dropped", 2.0)])),
        Ok(snap(&[("app", "users", 3.0)])),
    ]);
    let (r, metrics) = refresher(source, StalePolicy::Prune);
    r.run_cycle().await.unwrap();
    let report = r.run_cycle().await.unwrap();

    assert_eq!(report.pruned, 1);
    assert_eq!(metrics.tables().get(&GaugeKey::new("dropped", "app")), None);
    assert_eq!(metrics.tables().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn first_cycle_runs_immediately_then_on_interval() {
    let source = ScriptedSource::new(vec![Ok(snap(&[("app", "users", 1.0)]))]);
    let (r, metrics) = refresher(source.clone(), StalePolicy::Retain);
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(r.run_forever(rx));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert!(metrics.is_ready());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 4);

    tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_cycles_never_overlap() {
    let source = Arc::new(SlowSource {
        delay: Duration::from_secs(45),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        calls: AtomicUsize::new(0),
    });
    let (r, _metrics) = refresher(source.clone(), StalePolicy::Retain);
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(r.run_forever(rx));

    tokio::time::sleep(Duration::from_secs(300)).await;
    tx.send(true).unwrap();
    task.await.unwrap();

    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    // 45s cycles run back to back (0, 45, 90, ... 270).
    let calls = source.calls.load(Ordering::SeqCst);
    assert!((6..=7).contains(&calls), "calls = {calls}");
}

#[tokio::test(start_paused = true)]
async fn shutdown_beats_a_due_tick() {
    let source = ScriptedSource::new(vec![]);
    let (r, _metrics) = refresher(source.clone(), StalePolicy::Retain);
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(r.run_forever(rx));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    // Request shutdown, then make the next tick due before the loop wakes.
    tx.send(true).unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    task.await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn loop_stops_when_sender_is_dropped() {
    let source = ScriptedSource::new(vec![]);
    let (r, _metrics) = refresher(source, StalePolicy::Retain);
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(r.run_forever(rx));
    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop must exit")
        .unwrap();
}
