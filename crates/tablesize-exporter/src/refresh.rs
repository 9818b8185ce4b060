//! Periodic refresh: fetch a snapshot, write it into the registry.
//!
//! One task, one fetch in flight. The first cycle runs immediately; later
//! cycles follow a fixed-period interval whose missed ticks are delayed rather
//! than burst, so a slow cycle pushes the next one back instead of stacking.
//! A failed cycle leaves every gauge as it was.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use tablesize_core::{GaugeKey, Result, Snapshot};

use crate::config::StalePolicy;
use crate::obs::ExporterMetrics;
use crate::source::SnapshotSource;

/// What one successful cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub updated: usize,
    pub skipped: usize,
    pub pruned: usize,
    pub duration: Duration,
}

pub struct Refresher {
    source: Arc<dyn SnapshotSource>,
    metrics: Arc<ExporterMetrics>,
    interval: Duration,
    stale_policy: StalePolicy,
}

impl Refresher {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        metrics: Arc<ExporterMetrics>,
        interval: Duration,
        stale_policy: StalePolicy,
    ) -> Self {
        Self {
            source,
            metrics,
            interval,
            stale_policy,
        }
    }

    /// Run a single fetch-and-apply pass.
    ///
    /// Errors are logged and recorded in the self-metrics before being
    /// returned; the registry is untouched on that path.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();
        match self.source.fetch().await {
            Ok(snapshot) => {
                let (updated, pruned) = self.apply(&snapshot);
                let duration = started.elapsed();
                self.metrics
                    .record_success(duration, snapshot.skipped, unix_now());
                info!(
                    updated,
                    skipped = snapshot.skipped,
                    pruned,
                    database = %self.source.scope(),
                    elapsed_ms = duration.as_millis() as u64,
                    "updated table size metrics"
                );
                Ok(CycleReport {
                    updated,
                    skipped: snapshot.skipped,
                    pruned,
                    duration,
                })
            }
            Err(e) => {
                let duration = started.elapsed();
                self.metrics.record_failure(e.kind(), duration);
                error!(
                    kind = e.kind().as_str(),
                    error = %e,
                    database = %self.source.scope(),
                    "refresh failed; keeping previous values"
                );
                Err(e)
            }
        }
    }

    fn apply(&self, snapshot: &Snapshot) -> (usize, usize) {
        let tables = self.metrics.tables();
        for sample in &snapshot.samples {
            tables.set(sample.key(), sample.value());
        }

        // An empty read looks the same as lost privileges; never prune on it.
        let pruned = match self.stale_policy {
            StalePolicy::Prune if !snapshot.is_empty() => {
                let keep: HashSet<GaugeKey> = snapshot.samples.iter().map(|s| s.key()).collect();
                tables.retain_only(&keep)
            }
            _ => 0,
        };
        (snapshot.samples.len(), pruned)
    }

    /// Loop until `shutdown` turns true (or its sender goes away).
    pub async fn run_forever(self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.interval.as_millis() as u64, "refresh loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            // Shutdown is checked first so a due tick cannot start one more cycle.
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    // already logged and recorded
                    let _ = self.run_cycle().await;
                }
            }
        }
        info!("refresh loop stopped");
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
