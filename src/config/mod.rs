//! Runner configuration.
//!
//! One YAML file describes the data location, the cadence, the pipeline
//! steps and where alerts go. A handful of environment variables override
//! file values:
//!
//! - `STAFF_RUNNER_STATE_FILE`: path of the saved state
//! - `STAFF_RUNNER_START_DATE`: first tick when there is no saved state
//! - `STAFF_RUNNER_FAILURE_THRESHOLD`: net failures tolerated before alerting
//! - `STAFF_RUNNER_SMTP_HOST`: SMTP relay for alerts

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::{PipelineError, QualityError, TemplateError};
use crate::job::{
    JobSpec, SegmentationJob, StaffStatsJob, CENTERS_OPTION, CONFIG_OPTION, OUTPUT_OPTION,
};
use crate::locator::{
    FilePattern, FileLocator, FitsHeaderReader, DEFAULT_LOOKUP_CONCURRENCY,
    DEFAULT_QUALITY_KEYWORD,
};
use crate::notify::{EmailNotifier, LogNotifier, Notifier, SmtpSettings, DEFAULT_SMTP_PORT};
use crate::pipeline::{InputPolicy, Pipeline, PipelineStep};
use crate::quality::{IgnoreSet, QualityGate, DEFAULT_IGNORE_BITS};
use crate::scheduler::{
    ScheduleSettings, DEFAULT_AVAILABILITY_DELAY_SECS, DEFAULT_CADENCE_SECS,
    DEFAULT_FAILURE_THRESHOLD,
};

pub const ENV_STATE_FILE: &str = "STAFF_RUNNER_STATE_FILE";
pub const ENV_START_DATE: &str = "STAFF_RUNNER_START_DATE";
pub const ENV_FAILURE_THRESHOLD: &str = "STAFF_RUNNER_FAILURE_THRESHOLD";
pub const ENV_SMTP_HOST: &str = "STAFF_RUNNER_SMTP_HOST";

/// Errors that can occur while loading or applying the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A value has the wrong format.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid template in {field}: {source}")]
    Template {
        field: String,
        #[source]
        source: TemplateError,
    },

    #[error("Invalid pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Invalid quality setting: {0}")]
    Quality(#[from] QualityError),

    /// The file is not valid YAML for this schema.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Instance name, used in alert subjects and default file names.
    #[serde(default = "default_name")]
    pub name: String,
    pub data: DataConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Where the input images are and how they are judged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path template, e.g. `/data/{wavelength:04d}/AIA.{date:%Y%m%d_%H}*.fits`.
    pub file_pattern: String,
    #[serde(default = "default_ignore_bits")]
    pub ignore_quality_bits: Vec<u8>,
    /// HDU holding the quality keyword.
    #[serde(default = "default_hdu")]
    pub hdu: usize,
    #[serde(default = "default_quality_keyword")]
    pub quality_keyword: String,
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// First tick when there is no saved state.
    pub start_date: Option<String>,
    pub cadence_secs: u64,
    pub availability_delay_secs: u64,
    pub failure_threshold: u32,
    pub state_file: Option<PathBuf>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            cadence_secs: DEFAULT_CADENCE_SECS as u64,
            availability_delay_secs: DEFAULT_AVAILABILITY_DELAY_SECS as u64,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            state_file: None,
        }
    }
}

/// Program behind a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Command,
    /// Needs options `config` (and usually `centersFile`) and an `output`
    /// map template.
    Segmentation,
    /// Needs options `config` and `output`, and exactly two artifact
    /// inputs: the AR step then the CH step.
    StaffStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    #[serde(default)]
    pub kind: StepKind,
    pub executable: PathBuf,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub channels: Vec<u32>,
    #[serde(default)]
    pub artifact_inputs: Vec<String>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
    /// Overrides the default policy of the step kind.
    #[serde(default)]
    pub input_policy: Option<InputPolicy>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Path template expanded with the tick date.
    pub path: String,
    /// Flag passing the path to a command step. Ignored by the presets.
    #[serde(default)]
    pub flag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub recipients: Vec<String>,
    /// Defaults to `<name>@localhost`.
    #[serde(default)]
    pub sender: Option<String>,
    /// Without an SMTP block alerts are only logged.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub starttls: bool,
    #[serde(default)]
    pub username: Option<String>,
    /// Name of the environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// One CSV per successful tick.
    #[serde(default)]
    pub summary_directory: Option<PathBuf>,
    /// Prometheus text file rewritten after each tick.
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

fn default_name() -> String {
    "staff-runner".to_string()
}

fn default_ignore_bits() -> Vec<u8> {
    DEFAULT_IGNORE_BITS.to_vec()
}

fn default_hdu() -> usize {
    1
}

fn default_quality_keyword() -> String {
    DEFAULT_QUALITY_KEYWORD.to_string()
}

fn default_lookup_concurrency() -> usize {
    DEFAULT_LOOKUP_CONCURRENCY
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

impl AppConfig {
    /// Reads `path`, applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, an
    /// override is malformed, or validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&text)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses YAML without overrides or validation.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Applies the `STAFF_RUNNER_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_STATE_FILE) {
            self.schedule.state_file = Some(PathBuf::from(val));
        }

        if let Some(val) = lookup(ENV_START_DATE) {
            parse_date(&val).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_START_DATE.to_string(),
                message: format!("could not parse '{}'", val),
            })?;
            self.schedule.start_date = Some(val);
        }

        if let Some(val) = lookup(ENV_FAILURE_THRESHOLD) {
            self.schedule.failure_threshold = parse_env_value(&val, ENV_FAILURE_THRESHOLD)?;
        }

        if let Some(val) = lookup(ENV_SMTP_HOST) {
            match &mut self.notification {
                Some(NotificationConfig {
                    smtp: Some(smtp), ..
                }) => smtp.host = val,
                Some(notification) => {
                    notification.smtp = Some(SmtpConfig {
                        host: val,
                        port: DEFAULT_SMTP_PORT,
                        starttls: false,
                        username: None,
                        password_env: None,
                    })
                }
                None => warn!(
                    variable = ENV_SMTP_HOST,
                    "SMTP host set but no notification section, ignoring"
                ),
            }
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "name cannot be empty".to_string(),
            ));
        }

        if self.data.lookup_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "data.lookup_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.schedule.cadence_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "schedule.cadence_secs must be greater than 0".to_string(),
            ));
        }

        self.file_pattern()?;
        let ignore = self.ignore_set()?;
        if ignore.tolerates_missing_image() {
            warn!(
                "data.ignore_quality_bits includes bit 31, missing images will pass the quality check"
            );
        }

        if self.schedule.start_date.is_some() {
            self.start_date()?;
        }

        if self.steps.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "steps cannot be empty".to_string(),
            ));
        }
        self.build_pipeline()?;

        if let Some(notification) = &self.notification {
            if notification.recipients.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "notification.recipients cannot be empty".to_string(),
                ));
            }
            if let Some(smtp) = &notification.smtp {
                if smtp.host.trim().is_empty() {
                    return Err(ConfigError::ValidationFailed(
                        "notification.smtp.host cannot be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn file_pattern(&self) -> Result<FilePattern, ConfigError> {
        FilePattern::parse(&self.data.file_pattern).map_err(|source| ConfigError::Template {
            field: "data.file_pattern".to_string(),
            source,
        })
    }

    pub fn ignore_set(&self) -> Result<IgnoreSet, ConfigError> {
        Ok(IgnoreSet::new(self.data.ignore_quality_bits.iter().copied())?)
    }

    pub fn quality_gate(&self) -> Result<QualityGate, ConfigError> {
        Ok(QualityGate::new(self.ignore_set()?))
    }

    /// First tick date.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the date is missing or malformed.
    pub fn start_date(&self) -> Result<DateTime<Utc>, ConfigError> {
        let raw = self.schedule.start_date.as_deref().ok_or_else(|| {
            ConfigError::ValidationFailed(format!(
                "schedule.start_date is required (or set {})",
                ENV_START_DATE
            ))
        })?;
        parse_date(raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "schedule.start_date".to_string(),
            message: format!("could not parse '{}'", raw),
        })
    }

    /// State file path, `<name>_state.json` in the working directory by
    /// default.
    pub fn state_file(&self) -> PathBuf {
        self.schedule
            .state_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_state.json", self.name)))
    }

    pub fn build_locator(&self) -> Result<FileLocator, ConfigError> {
        Ok(FileLocator::new(
            self.file_pattern()?,
            self.quality_gate()?,
            Arc::new(FitsHeaderReader::new(self.data.hdu)),
        )
        .with_quality_keyword(self.data.quality_keyword.clone())
        .with_concurrency(self.data.lookup_concurrency))
    }

    pub fn build_pipeline(&self) -> Result<Pipeline, ConfigError> {
        let steps = self
            .steps
            .iter()
            .map(build_step)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Pipeline::new(steps)?)
    }

    /// Email notifier when an SMTP relay is configured, log notifier
    /// otherwise.
    pub fn build_notifier(&self) -> Result<Arc<dyn Notifier>, ConfigError> {
        let Some(notification) = &self.notification else {
            return Ok(Arc::new(LogNotifier));
        };
        let Some(smtp) = &notification.smtp else {
            warn!("No SMTP relay configured, alerts will only be logged");
            return Ok(Arc::new(LogNotifier));
        };

        let password = match &smtp.password_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| ConfigError::MissingEnvVar(var.clone()))?,
            ),
            None => None,
        };
        let settings = SmtpSettings {
            host: smtp.host.clone(),
            port: smtp.port,
            starttls: smtp.starttls,
            username: smtp.username.clone(),
            password,
        };
        let sender = notification
            .sender
            .clone()
            .unwrap_or_else(|| format!("{}@localhost", self.name));

        Ok(Arc::new(EmailNotifier::new(
            sender,
            notification.recipients.clone(),
            settings,
        )))
    }

    pub fn schedule_settings(
        &self,
        log_file: Option<&Path>,
    ) -> Result<ScheduleSettings, ConfigError> {
        let mut settings = ScheduleSettings::new(self.name.clone(), self.start_date()?)
            .with_cadence(seconds(self.schedule.cadence_secs, "schedule.cadence_secs")?)
            .with_availability_delay(seconds(
                self.schedule.availability_delay_secs,
                "schedule.availability_delay_secs",
            )?)
            .with_failure_threshold(self.schedule.failure_threshold);
        if let Some(path) = log_file {
            settings = settings.with_log_file(path);
        }
        Ok(settings)
    }

    pub fn cadence(&self) -> Result<TimeDelta, ConfigError> {
        seconds(self.schedule.cadence_secs, "schedule.cadence_secs")
    }
}

fn seconds(value: u64, key: &str) -> Result<TimeDelta, ConfigError> {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{} seconds is out of range", value),
        })
}

fn build_step(step: &StepConfig) -> Result<PipelineStep, ConfigError> {
    let field = |what: &str| format!("steps.{}.{}", step.name, what);
    let timeout = step.timeout_secs.map(Duration::from_secs);

    let built = match step.kind {
        StepKind::Segmentation => {
            if !step.artifact_inputs.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} is not allowed for segmentation steps",
                    field("artifact_inputs")
                )));
            }
            let output = step.output.as_ref().ok_or_else(|| {
                ConfigError::ValidationFailed(format!("{} is required", field("output")))
            })?;
            let map = FilePattern::parse(&output.path).map_err(|source| {
                ConfigError::Template {
                    field: field("output.path"),
                    source,
                }
            })?;

            let mut options = step.options.clone();
            let config = take_required(&mut options, CONFIG_OPTION, &field)?;
            let centers = options.remove(CENTERS_OPTION).unwrap_or_default();
            let mut job = SegmentationJob::new(&step.executable, config, centers)
                .with_extra_options(options);
            if let Some(timeout) = timeout {
                job = job.with_timeout(timeout);
            }
            PipelineStep::segmentation(&step.name, job, step.channels.clone(), map)
        }
        StepKind::StaffStats => {
            let [ar_step, ch_step] = step.artifact_inputs.as_slice() else {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must name the AR step then the CH step",
                    field("artifact_inputs")
                )));
            };
            if step.output.is_some() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} is not allowed for staff_stats steps, use options.output",
                    field("output")
                )));
            }

            let mut options = step.options.clone();
            let config = take_required(&mut options, CONFIG_OPTION, &field)?;
            let output_directory = take_required(&mut options, OUTPUT_OPTION, &field)?;
            let mut job = StaffStatsJob::new(&step.executable, config, output_directory)
                .with_extra_options(options);
            if let Some(timeout) = timeout {
                job = job.with_timeout(timeout);
            }
            PipelineStep::staff_stats(
                &step.name,
                job,
                ar_step.as_str(),
                ch_step.as_str(),
                step.channels.clone(),
            )
        }
        StepKind::Command => {
            let mut spec = JobSpec::new(&step.executable).with_options(step.options.clone());
            if let Some(timeout) = timeout {
                spec = spec.with_timeout(timeout);
            }
            let mut built = PipelineStep::command(&step.name, spec)
                .with_channels(step.channels.clone())
                .with_artifact_inputs(step.artifact_inputs.clone());
            if let Some(output) = &step.output {
                let path = FilePattern::parse(&output.path).map_err(|source| {
                    ConfigError::Template {
                        field: field("output.path"),
                        source,
                    }
                })?;
                built = built.with_output(path, output.flag.clone());
            }
            built
        }
    };

    Ok(match step.input_policy {
        Some(policy) => built.with_input_policy(policy),
        None => built,
    })
}

fn take_required(
    options: &mut BTreeMap<String, String>,
    key: &str,
    field: &dyn Fn(&str) -> String,
) -> Result<String, ConfigError> {
    match options.remove(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::ValidationFailed(format!(
            "{} is required",
            field(&format!("options.{}", key))
        ))),
    }
}

/// Parses RFC 3339, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` or
/// `YYYY-MM-DD`. Dates without an offset are UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(value, format) {
            return Some(date.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
