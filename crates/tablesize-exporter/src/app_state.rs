//! Shared application state for the exporter's HTTP side.
//!
//! The metrics registry is built once in `main` and handed to both the
//! refresh loop and this state; handlers only read from it.

use std::sync::Arc;

use crate::config::ExporterConfig;
use crate::obs::ExporterMetrics;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    metrics: Arc<ExporterMetrics>,
}

struct AppStateInner {
    cfg: ExporterConfig,
}

impl AppState {
    pub fn new(cfg: ExporterConfig, metrics: Arc<ExporterMetrics>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { cfg }),
            metrics,
        }
    }

    pub fn cfg(&self) -> &ExporterConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    pub fn is_draining(&self) -> bool {
        self.metrics.is_draining()
    }
}
