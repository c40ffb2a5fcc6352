//! Flat key/value tables written after each successful tick.
//!
//! Every table has one header row with the column names in sorted order and
//! one value row, which is the layout downstream plotting scripts read.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::pipeline::{StepStatus, TickReport};

/// Column name of the tick date.
pub const DATE_COLUMN: &str = "date";

/// Format of the tick date in file names.
pub const FILE_DATE_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A single-row table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsTable {
    columns: BTreeMap<String, String>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column` to `value`, replacing any previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl ToString) {
        self.columns.insert(column.into(), value.to_string());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Renders the header and value rows.
    pub fn to_csv(&self) -> String {
        let header: Vec<String> = self.columns.keys().map(|k| escape(k)).collect();
        let values: Vec<String> = self.columns.values().map(|v| escape(v)).collect();
        format!("{}\n{}\n", header.join(","), values.join(","))
    }

    /// Writes the table to `path` through a temporary file.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(self.to_csv().as_bytes())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Summarizes a tick: date, per-step status, duration and artifact, and the
/// file chosen for each channel.
pub fn tick_summary(report: &TickReport) -> StatsTable {
    let mut table = StatsTable::new();
    table.insert(DATE_COLUMN, report.date.format("%Y-%m-%dT%H:%M:%S"));

    for (channel, path) in &report.inputs {
        let value = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        table.insert(format!("input_{:04}", channel), value);
    }

    for step in &report.steps {
        table.insert(format!("{}_status", step.name), step.status.label());
        let duration = step
            .status
            .duration()
            .map(|d| format!("{:.3}", d.as_secs_f64()))
            .unwrap_or_default();
        table.insert(format!("{}_duration_secs", step.name), duration);
        if let StepStatus::Succeeded {
            artifact: Some(path),
            ..
        } = &step.status
        {
            table.insert(format!("{}_artifact", step.name), path.display());
        }
    }

    table
}

/// Writes one summary file per tick into a directory.
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    directory: PathBuf,
}

impl SummaryWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Summary path for the tick at `date`.
    pub fn path_for(&self, date: &DateTime<Utc>) -> PathBuf {
        self.directory
            .join(format!("{}.csv", date.format(FILE_DATE_FORMAT)))
    }

    /// Writes the summary of `report`, replacing any earlier one for the
    /// same tick.
    pub fn write(&self, report: &TickReport) -> std::io::Result<PathBuf> {
        let path = self.path_for(&report.date);
        tick_summary(report).write(&path)?;
        Ok(path)
    }
}
