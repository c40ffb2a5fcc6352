//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by staff_runner and
//! provides functions for initializing, registering, and exporting them. A
//! long-running scheduler has no HTTP endpoint, so the text exposition is
//! written to a file that a node exporter textfile collector can pick up.

use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Global Prometheus registry for all staff_runner metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of ticks processed, labeled by status.
pub static TICKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total pipeline step runs, labeled by step and status.
pub static STEP_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Step execution duration in seconds, labeled by step.
pub static STEP_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Total file lookups, labeled by result (found, not_found, error).
pub static LOCATOR_LOOKUPS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Current value of the failure counter.
pub static FAILURE_COUNT: OnceLock<Gauge> = OnceLock::new();

/// Total operator alerts, labeled by outcome (sent, failed).
pub static ALERTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// This function should be called once at application startup. Later calls
/// leave the first registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let ticks_total = CounterVec::new(
        Opts::new("staff_runner_ticks_total", "Total number of ticks processed"),
        &["status"],
    )?;

    let step_runs_total = CounterVec::new(
        Opts::new("staff_runner_step_runs_total", "Total pipeline step runs"),
        &["step", "status"],
    )?;

    let step_duration = HistogramVec::new(
        HistogramOpts::new(
            "staff_runner_step_duration_seconds",
            "Pipeline step execution duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["step"],
    )?;

    let locator_lookups_total = CounterVec::new(
        Opts::new("staff_runner_locator_lookups_total", "Total candidate file lookups"),
        &["result"],
    )?;

    let failure_count = Gauge::new(
        "staff_runner_failure_count",
        "Current value of the scheduler failure counter",
    )?;

    let alerts_total = CounterVec::new(
        Opts::new("staff_runner_alerts_total", "Total operator alerts"),
        &["outcome"],
    )?;

    registry.register(Box::new(ticks_total.clone()))?;
    registry.register(Box::new(step_runs_total.clone()))?;
    registry.register(Box::new(step_duration.clone()))?;
    registry.register(Box::new(locator_lookups_total.clone()))?;
    registry.register(Box::new(failure_count.clone()))?;
    registry.register(Box::new(alerts_total.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = TICKS_TOTAL.set(ticks_total);
    let _ = STEP_RUNS_TOTAL.set(step_runs_total);
    let _ = STEP_DURATION.set(step_duration);
    let _ = LOCATOR_LOOKUPS_TOTAL.set(locator_lookups_total);
    let _ = FAILURE_COUNT.set(failure_count);
    let _ = ALERTS_TOTAL.set(alerts_total);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, returns a
/// comment line describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// Writes the current exposition to `path`.
///
/// The text goes to a temporary file in the same directory which is then
/// renamed over `path`, so a scraper never reads a half-written file.
pub fn write_metrics_file(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(export_metrics().as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        assert!(result.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn test_metrics_after_init() {
        let _ = init_metrics();

        if let Some(ticks) = TICKS_TOTAL.get() {
            ticks.with_label_values(&["succeeded"]).inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        assert!(metrics.contains("staff_runner_ticks_total"));
    }

    #[test]
    fn test_write_metrics_file() {
        let _ = init_metrics();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("staff_runner.prom");

        write_metrics_file(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.is_empty());
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
