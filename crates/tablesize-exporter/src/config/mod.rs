//! Exporter config loader (strict YAML + environment overlay).
//!
//! Resolution order: built-in defaults, then the YAML file (if present), then
//! environment variables. Validation runs once on the merged result.

pub mod schema;

use std::fs;
use std::path::Path;

use tablesize_core::error::{ExporterError, Result};

pub use schema::{DatabaseConfig, ExporterConfig, ExporterSection, StalePolicy};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "TABLESIZE_CONFIG";
/// Config file used when `TABLESIZE_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "tablesize.yaml";

/// Load config for the running process.
///
/// A missing default file is fine (defaults + env); a missing file named
/// explicitly through `TABLESIZE_CONFIG` is an error.
pub fn load() -> Result<ExporterConfig> {
    let mut cfg = match config_path(std::env::var(CONFIG_PATH_ENV).ok()) {
        Some(path) => parse_file(&path)?,
        None => ExporterConfig::default(),
    };

    apply_env(&mut cfg, |k| std::env::var(k).ok());
    cfg.validate()?;
    Ok(cfg)
}

/// File to read, if any. An empty `TABLESIZE_CONFIG` counts as unset.
fn config_path(explicit: Option<String>) -> Option<String> {
    match explicit.filter(|p| !p.trim().is_empty()) {
        Some(path) => Some(path),
        None => Path::new(DEFAULT_CONFIG_PATH)
            .exists()
            .then(|| DEFAULT_CONFIG_PATH.to_string()),
    }
}

pub fn load_from_str(s: &str) -> Result<ExporterConfig> {
    let cfg = parse_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

fn parse_file(path: &str) -> Result<ExporterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ExporterError::Config(format!("read config {path} failed: {e}")))?;
    parse_str(&s)
}

fn parse_str(s: &str) -> Result<ExporterConfig> {
    serde_yaml::from_str(s).map_err(|e| ExporterError::Config(format!("invalid yaml: {e}")))
}

/// Overlay environment settings onto `cfg`.
///
/// `lookup` abstracts `std::env::var` so tests do not touch process state.
/// Unparseable numeric overrides are ignored with a warning.
pub fn apply_env<F>(cfg: &mut ExporterConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("DB_USER") {
        cfg.database.user = v;
    }
    if let Some(v) = lookup("DB_PASSWORD") {
        cfg.database.password = v;
    }
    if let Some(v) = lookup("DB_HOST") {
        cfg.database.host = v;
    }
    if let Some(v) = lookup("DB_NAME") {
        cfg.database.name = v;
    }
    if let Some(v) = lookup("TABLESIZE_LISTEN") {
        cfg.exporter.listen = v;
    }
    if let Some(v) = lookup("TABLESIZE_INTERVAL_MS") {
        match v.parse() {
            Ok(ms) => cfg.exporter.interval_ms = ms,
            Err(_) => tracing::warn!(value = %v, "ignoring non-numeric TABLESIZE_INTERVAL_MS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            config_path(Some("/etc/tablesize.yaml".into())).as_deref(),
            Some("/etc/tablesize.yaml")
        );
    }

    #[test]
    fn empty_path_is_unset() {
        let fallback = Path::new(DEFAULT_CONFIG_PATH)
            .exists()
            .then(|| DEFAULT_CONFIG_PATH.to_string());
        assert_eq!(config_path(Some(String::new())), fallback);
        assert_eq!(config_path(Some("  ".into())), fallback);
        assert_eq!(config_path(None), fallback);
    }
}
