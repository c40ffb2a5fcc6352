//! High-level interface for recording scheduler metrics.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics so callers never deal
//! with label ordering. Every method is a no-op until `init_metrics()` ran,
//! which keeps unit tests free of global setup.

use std::time::Duration;

use super::prometheus::{
    ALERTS_TOTAL, FAILURE_COUNT, LOCATOR_LOOKUPS_TOTAL, STEP_DURATION, STEP_RUNS_TOTAL,
    TICKS_TOTAL,
};

/// Metrics collector for recording staff_runner operational metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record a finished tick.
    ///
    /// # Arguments
    ///
    /// * `status` - Tick outcome ("succeeded" or "failed")
    pub fn record_tick(&self, status: &str) {
        if let Some(ticks) = TICKS_TOTAL.get() {
            ticks.with_label_values(&[status]).inc();
        }

        tracing::trace!(status = status, "Recorded tick metric");
    }

    /// Record one pipeline step outcome.
    ///
    /// Skipped steps carry no duration.
    pub fn record_step(&self, step: &str, status: &str, duration: Option<Duration>) {
        if let Some(runs) = STEP_RUNS_TOTAL.get() {
            runs.with_label_values(&[step, status]).inc();
        }

        if let (Some(histogram), Some(duration)) = (STEP_DURATION.get(), duration) {
            histogram
                .with_label_values(&[step])
                .observe(duration.as_secs_f64());
        }

        tracing::trace!(step = step, status = status, "Recorded step metric");
    }

    /// Record a file lookup result ("found", "not_found" or "error").
    pub fn record_lookup(&self, result: &str) {
        if let Some(lookups) = LOCATOR_LOOKUPS_TOTAL.get() {
            lookups.with_label_values(&[result]).inc();
        }
    }

    /// Update the failure counter gauge.
    pub fn update_failure_count(&self, count: u32) {
        if let Some(gauge) = FAILURE_COUNT.get() {
            gauge.set(count as f64);
        }
    }

    /// Record an alert delivery attempt.
    pub fn record_alert(&self, sent: bool) {
        let outcome = if sent { "sent" } else { "failed" };
        if let Some(alerts) = ALERTS_TOTAL.get() {
            alerts.with_label_values(&[outcome]).inc();
        }

        tracing::trace!(outcome = outcome, "Recorded alert metric");
    }
}
