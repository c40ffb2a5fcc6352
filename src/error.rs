//! Error types for staff-runner operations.
//!
//! Defines the error taxonomy shared across subsystems:
//! - Quality bit configuration
//! - File pattern templates and candidate lookup
//! - FITS header reading
//! - External job execution
//! - Pipeline definition
//! - Resumable state persistence
//! - Operator notification
//!
//! Configuration errors live in [`crate::config::ConfigError`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while building a quality ignore set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QualityError {
    #[error("Quality bit {0} is out of range (expected 0..=31)")]
    InvalidBit(u8),
}

/// Errors raised while parsing or expanding a file pattern template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Unbalanced brace at offset {offset} in template '{template}'")]
    UnbalancedBrace { template: String, offset: usize },

    #[error("Unknown field '{field}' in template '{template}'")]
    UnknownField { template: String, field: String },

    #[error("Invalid format spec '{spec}' for field '{field}'")]
    InvalidFormat { field: String, spec: String },

    #[error("Template '{template}' needs a channel but none was supplied")]
    MissingChannel { template: String },
}

/// Errors that can occur while reading a FITS header.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("File '{0}' is not a FITS file (missing SIMPLE card)")]
    NotFits(PathBuf),

    #[error("File '{path}' has no HDU {hdu}")]
    HduNotFound { path: PathBuf, hdu: usize },

    #[error("Malformed header in '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Keyword '{keyword}' has non-integer value '{value}'")]
    NotAnInteger { keyword: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while locating candidate files.
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("Header lookup task failed: {0}")]
    Join(String),
}

/// Terminal failure of a single external job invocation.
///
/// Each variant identifies which check failed and carries the captured
/// output needed to diagnose the failure outside the process.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("Could not start '{executable}': {message}")]
    Spawn { executable: String, message: String },

    #[error("'{executable}' exited with code {code}: {stderr}")]
    NonZeroExit {
        executable: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("'{executable}' was terminated by a signal: {stderr}")]
    Terminated {
        executable: String,
        stdout: String,
        stderr: String,
    },

    #[error("'{executable}' timed out after {timeout:?}")]
    TimedOut {
        executable: String,
        timeout: Duration,
    },

    #[error("'{executable}' succeeded but could not find output file {}", path.display())]
    MissingArtifact {
        executable: String,
        path: PathBuf,
        stdout: String,
        stderr: String,
    },
}

impl JobError {
    /// Name of the executable that failed.
    pub fn executable(&self) -> &str {
        match self {
            JobError::Spawn { executable, .. }
            | JobError::NonZeroExit { executable, .. }
            | JobError::Terminated { executable, .. }
            | JobError::TimedOut { executable, .. }
            | JobError::MissingArtifact { executable, .. } => executable,
        }
    }

    /// Short label for metrics and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Spawn { .. } => "spawn_failed",
            JobError::NonZeroExit { .. } => "non_zero_exit",
            JobError::Terminated { .. } => "terminated",
            JobError::TimedOut { .. } => "timed_out",
            JobError::MissingArtifact { .. } => "missing_artifact",
        }
    }
}

/// Errors in the definition of a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline has no steps")]
    Empty,

    #[error("Step name cannot be empty")]
    EmptyName,

    #[error("Duplicate step name '{0}'")]
    DuplicateStep(String),

    #[error("Step '{step}' consumes '{input}', which is not an earlier step")]
    UnknownArtifactInput { step: String, input: String },

    #[error("Step '{step}' consumes '{input}', which declares no output")]
    ArtifactWithoutOutput { step: String, input: String },

    #[error("Output path of step '{step}' is invalid: {source}")]
    InvalidOutput {
        step: String,
        #[source]
        source: TemplateError,
    },
}

/// Errors that can occur while loading or saving the scheduler state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Unsupported state version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Could not persist state to {}: {message}", path.display())]
    Persist { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while sending an operator notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),

    #[error("No recipients configured")]
    NoRecipients,
}
