//! Ordered execution of pipeline steps for one tick.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::step::PipelineStep;
use crate::error::{JobError, PipelineError};
use crate::job::JobRunner;
use crate::metrics::MetricsCollector;

/// Resolved file of each channel for one tick. `None` means no usable file.
pub type ResolvedInputs = BTreeMap<u32, Option<PathBuf>>;

/// Why a step was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The input policy was not met. Carries the channels without a file.
    MissingInputs(Vec<u32>),
    /// An earlier step failed or was skipped.
    UpstreamFailed(String),
    /// The output path could not be built.
    InvalidOutput(String),
    /// The artifacts of these steps were not available.
    MissingArtifacts(Vec<String>),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingInputs(channels) => {
                write!(f, "no usable file for {:?}", channels)
            }
            SkipReason::UpstreamFailed(step) => write!(f, "step '{}' did not succeed", step),
            SkipReason::InvalidOutput(message) => write!(f, "invalid output path: {}", message),
            SkipReason::MissingArtifacts(steps) => {
                write!(f, "missing artifacts of {}", steps.join(", "))
            }
        }
    }
}

/// Outcome of one step within a tick.
#[derive(Debug, Clone)]
pub enum StepStatus {
    Succeeded {
        artifact: Option<PathBuf>,
        duration: Duration,
    },
    Failed {
        error: JobError,
        duration: Duration,
    },
    Skipped(SkipReason),
}

impl StepStatus {
    /// Short label for metrics and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Succeeded { .. } => "succeeded",
            StepStatus::Failed { .. } => "failed",
            StepStatus::Skipped(_) => "skipped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded { .. })
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            StepStatus::Succeeded { duration, .. } | StepStatus::Failed { duration, .. } => {
                Some(*duration)
            }
            StepStatus::Skipped(_) => None,
        }
    }
}

/// Recorded outcome of one step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: String,
    pub images: Vec<PathBuf>,
    pub status: StepStatus,
}

/// Everything that happened during one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub date: DateTime<Utc>,
    pub inputs: ResolvedInputs,
    pub steps: Vec<StepRecord>,
}

impl TickReport {
    /// A tick succeeds only if every step ran and succeeded.
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_success())
    }

    /// Returns the first step that did not succeed.
    pub fn first_problem(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.status.is_success())
    }

    /// Returns the record of `step`.
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Ordered list of steps run once per tick.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    metrics: MetricsCollector,
}

impl Pipeline {
    /// Checks the step graph and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if step names are empty or duplicated, if a
    /// step consumes a later step or one without output, or if an output
    /// template cannot be expanded from a date alone.
    pub fn new(steps: Vec<PipelineStep>) -> Result<Self, PipelineError> {
        if steps.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut with_output: HashMap<&str, bool> = HashMap::new();
        for step in &steps {
            if step.name().is_empty() {
                return Err(PipelineError::EmptyName);
            }
            if with_output.contains_key(step.name()) {
                return Err(PipelineError::DuplicateStep(step.name().to_string()));
            }
            for input in step.artifact_inputs() {
                match with_output.get(input) {
                    None => {
                        return Err(PipelineError::UnknownArtifactInput {
                            step: step.name().to_string(),
                            input: input.to_string(),
                        })
                    }
                    Some(false) => {
                        return Err(PipelineError::ArtifactWithoutOutput {
                            step: step.name().to_string(),
                            input: input.to_string(),
                        })
                    }
                    Some(true) => {}
                }
            }
            if let Some(pattern) = step.output_pattern() {
                if pattern.uses_channel() {
                    return Err(PipelineError::InvalidOutput {
                        step: step.name().to_string(),
                        source: crate::error::TemplateError::MissingChannel {
                            template: pattern.as_str().to_string(),
                        },
                    });
                }
            }
            with_output.insert(step.name(), step.output_pattern().is_some());
        }

        Ok(Self {
            steps,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Union of the channels of every step, ascending.
    pub fn required_channels(&self) -> Vec<u32> {
        self.steps
            .iter()
            .flat_map(|s| s.channels().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Runs every step in order for the tick at `date`.
    ///
    /// Steps run strictly one after the other. Once a step is skipped or
    /// fails, every later step is skipped without being attempted.
    pub async fn run(
        &self,
        date: DateTime<Utc>,
        inputs: &ResolvedInputs,
        runner: &dyn JobRunner,
    ) -> TickReport {
        let mut artifacts: HashMap<&str, PathBuf> = HashMap::new();
        let mut records = Vec::with_capacity(self.steps.len());
        let mut blocked_by: Option<String> = None;

        for step in &self.steps {
            let record = match &blocked_by {
                Some(upstream) => StepRecord {
                    name: step.name().to_string(),
                    images: Vec::new(),
                    status: StepStatus::Skipped(SkipReason::UpstreamFailed(upstream.clone())),
                },
                None => self.run_step(step, date, inputs, &artifacts, runner).await,
            };

            self.metrics
                .record_step(step.name(), record.status.label(), record.status.duration());

            match &record.status {
                StepStatus::Succeeded {
                    artifact: Some(path),
                    ..
                } => {
                    artifacts.insert(step.name(), path.clone());
                }
                StepStatus::Succeeded { .. } => {}
                _ => {
                    if blocked_by.is_none() {
                        blocked_by = Some(step.name().to_string());
                    }
                }
            }
            records.push(record);
        }

        TickReport {
            date,
            inputs: inputs.clone(),
            steps: records,
        }
    }

    async fn run_step(
        &self,
        step: &PipelineStep,
        date: DateTime<Utc>,
        inputs: &ResolvedInputs,
        artifacts: &HashMap<&str, PathBuf>,
        runner: &dyn JobRunner,
    ) -> StepRecord {
        let name = step.name().to_string();

        let images = match step.select_images(inputs) {
            Ok(images) => images,
            Err(missing) => {
                warn!(
                    step = %name,
                    date = %date,
                    missing = ?missing,
                    "Skipping step, input files unavailable"
                );
                return StepRecord {
                    name,
                    images: Vec::new(),
                    status: StepStatus::Skipped(SkipReason::MissingInputs(missing)),
                };
            }
        };

        let missing_channels: Vec<u32> = step
            .channels()
            .iter()
            .copied()
            .filter(|c| !matches!(inputs.get(c), Some(Some(_))))
            .collect();
        if !missing_channels.is_empty() {
            warn!(
                step = %name,
                date = %date,
                missing = ?missing_channels,
                "Running with partial inputs"
            );
        }

        // Validated at construction: every artifact input is an earlier
        // step with an output, and earlier steps all succeeded.
        let upstream: Vec<PathBuf> = step
            .artifact_inputs()
            .into_iter()
            .filter_map(|input| artifacts.get(input).cloned())
            .collect();

        let invocation = match step.invocation(&date, &images, &upstream) {
            Ok(invocation) => invocation,
            Err(reason) => {
                warn!(step = %name, date = %date, reason = %reason, "Skipping step");
                return StepRecord {
                    name,
                    images,
                    status: StepStatus::Skipped(reason),
                };
            }
        };
        let output = invocation.declared_output().map(Path::to_path_buf);

        if let Some(parent) = output.as_deref().and_then(Path::parent) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(
                    step = %name,
                    dir = %parent.display(),
                    error = %e,
                    "Could not create output directory"
                );
            }
        }

        let result = runner.run(step.spec(), &invocation).await;
        let duration = result.duration;

        let status = match result.error {
            None => {
                info!(
                    step = %name,
                    date = %date,
                    duration_secs = duration.as_secs_f64(),
                    "Step succeeded"
                );
                StepStatus::Succeeded {
                    artifact: output,
                    duration,
                }
            }
            Some(error) => StepStatus::Failed { error, duration },
        };

        StepRecord {
            name,
            images,
            status,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Job runner double that records invocations instead of spawning.

    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::JobError;
    use crate::job::{Invocation, JobResult, JobRunner, JobSpec};

    #[derive(Default)]
    pub struct RecordingRunner {
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
        /// Executables that exit with code 1.
        pub failing: HashSet<String>,
        /// Executables that exit 0 without writing their output.
        pub forgetful: HashSet<String>,
    }

    impl RecordingRunner {
        pub fn failing(mut self, executable: &str) -> Self {
            self.failing.insert(executable.to_string());
            self
        }

        pub fn forgetful(mut self, executable: &str) -> Self {
            self.forgetful.insert(executable.to_string());
            self
        }

        pub fn executables(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(e, _)| e.clone())
                .collect()
        }
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, spec: &JobSpec, invocation: &Invocation) -> JobResult {
            let executable = spec.name();
            let argv = spec.command_line(invocation);
            self.calls
                .lock()
                .unwrap()
                .push((executable.clone(), argv.clone()));

            let declared_output = invocation.declared_output().map(PathBuf::from);
            let error = if self.failing.contains(&executable) {
                Some(JobError::NonZeroExit {
                    executable: executable.clone(),
                    code: 1,
                    stdout: String::new(),
                    stderr: "failed".to_string(),
                })
            } else if let Some(path) = &declared_output {
                if self.forgetful.contains(&executable) {
                    Some(JobError::MissingArtifact {
                        executable: executable.clone(),
                        path: path.clone(),
                        stdout: String::new(),
                        stderr: String::new(),
                    })
                } else {
                    std::fs::write(path, b"map").unwrap();
                    None
                }
            } else {
                None
            };

            JobResult {
                executable,
                argv,
                exit_code: Some(if self.failing.contains(&spec.name()) { 1 } else { 0 }),
                stdout: String::new(),
                stderr: String::new(),
                duration: Duration::from_millis(5),
                declared_output,
                error,
            }
        }
    }
}
