//! Prometheus text exposition (format 0.0.4) writer helpers.
//!
//! Label order is preserved as given; callers pass labels in the order they
//! want them rendered.

use std::fmt::Write;

/// Content type served alongside the rendered body.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Escape a label value.
pub fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Escape HELP text (quotes are allowed there).
fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

pub fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

/// `# HELP` and `# TYPE` lines for one metric family.
pub fn write_header(out: &mut String, name: &str, help: &str, kind: MetricKind) {
    let _ = writeln!(out, "# HELP {} {}", name, escape_help(help));
    let _ = writeln!(out, "# TYPE {} {}", name, kind.as_str());
}

/// One sample line.
pub fn write_sample(out: &mut String, name: &str, labels: &[(&str, &str)], value: f64) {
    if labels.is_empty() {
        let _ = writeln!(out, "{} {}", name, format_value(value));
        return;
    }
    let label_str = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",");
    let _ = writeln!(out, "{}{{{}}} {}", name, label_str, format_value(value));
}
