//! staff_runner: unattended scheduler for SDO/AIA segmentation and STAFF
//! statistics.
//!
//! Every tick picks the best quality image per wavelength, runs a chain of
//! external programs on them, keeps a resumable cursor on disk, and alerts
//! operators when failures pile up.

pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod locator;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod scheduler;

// Re-export commonly used error types
pub use error::{
    HeaderError, JobError, LocatorError, NotifyError, PipelineError, QualityError, StateError,
    TemplateError,
};
