//! Metrics module for Prometheus-based monitoring.
//!
//! Counts ticks, step runs, file lookups and alerts, and tracks the current
//! failure counter.
//!
//! # Example
//!
//! ```ignore
//! use staff_runner::metrics::{init_metrics, write_metrics_file, MetricsCollector};
//!
//! init_metrics()?;
//! MetricsCollector::new().record_tick("succeeded");
//! write_metrics_file(Path::new("/var/lib/node_exporter/staff_runner.prom"))?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics, write_metrics_file};

pub use prometheus::{
    ALERTS_TOTAL, FAILURE_COUNT, LOCATOR_LOOKUPS_TOTAL, REGISTRY, STEP_DURATION,
    STEP_RUNS_TOTAL, TICKS_TOTAL,
};
