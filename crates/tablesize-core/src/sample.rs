//! Storage readings produced by a snapshot source.

use crate::error::{ExporterError, Result};

/// One table-size reading. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    scope: String,
    name: String,
    value: f64,
}

impl MetricSample {
    /// Validates the reading; a rejected sample is a row decode failure.
    pub fn new(scope: impl Into<String>, name: impl Into<String>, value: f64) -> Result<Self> {
        let scope = scope.into();
        let name = name.into();
        if scope.is_empty() {
            return Err(ExporterError::RowDecode("empty scope".into()));
        }
        if name.is_empty() {
            return Err(ExporterError::RowDecode(format!("empty name in scope {scope}")));
        }
        if !value.is_finite() || value < 0.0 {
            return Err(ExporterError::RowDecode(format!(
                "invalid size {value} for {scope}.{name}"
            )));
        }
        Ok(Self { scope, name, value })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn key(&self) -> GaugeKey {
        GaugeKey::new(self.name.clone(), self.scope.clone())
    }
}

/// Registry key: (entity name, scope). Both are opaque labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GaugeKey {
    pub name: String,
    pub scope: String,
}

impl GaugeKey {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
        }
    }
}

/// Result of one fetch: decoded samples plus the number of rows dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub samples: Vec<MetricSample>,
    pub skipped: usize,
}

impl Snapshot {
    /// Collect decoded rows, counting (not propagating) decode failures.
    ///
    /// The callback sees every rejected row so callers can log it.
    pub fn collect<I, F>(rows: I, mut on_skip: F) -> Self
    where
        I: IntoIterator<Item = Result<MetricSample>>,
        F: FnMut(&ExporterError),
    {
        let mut snap = Snapshot::default();
        for row in rows {
            match row {
                Ok(sample) => snap.samples.push(sample),
                Err(e) => {
                    on_skip(&e);
                    snap.skipped += 1;
                }
            }
        }
        snap
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
