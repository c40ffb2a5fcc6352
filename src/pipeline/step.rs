//! A single named pipeline stage.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chain::SkipReason;
use crate::error::TemplateError;
use crate::job::{Invocation, JobSpec, SegmentationJob, StaffStatsJob};
use crate::locator::FilePattern;

/// How a step reacts to channels without a usable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPolicy {
    /// Every channel must have a file.
    #[default]
    All,
    /// Runs with whatever is available, as long as one channel has a file.
    AtLeastOne,
}

/// Output file of a generic command step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Path template, expanded with the tick date.
    pub path: FilePattern,
    /// Flag used to pass the path to the program, if any.
    pub flag: Option<String>,
}

/// What a step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepJob {
    /// Classification run producing a segmentation map.
    Segmentation {
        job: SegmentationJob,
        map: FilePattern,
    },
    /// STAFF statistics over the maps of two earlier steps.
    StaffStats {
        job: StaffStatsJob,
        ar_step: String,
        ch_step: String,
    },
    /// Any other program.
    Command {
        spec: JobSpec,
        artifact_inputs: Vec<String>,
        output: Option<StepOutput>,
    },
}

/// Named stage of a [`super::Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    name: String,
    job: StepJob,
    channels: Vec<u32>,
    input_policy: InputPolicy,
}

impl PipelineStep {
    /// A segmentation step writing its map to `map`.
    pub fn segmentation(
        name: impl Into<String>,
        job: SegmentationJob,
        channels: Vec<u32>,
        map: FilePattern,
    ) -> Self {
        Self {
            name: name.into(),
            job: StepJob::Segmentation { job, map },
            channels,
            input_policy: InputPolicy::All,
        }
    }

    /// A statistics step over the maps of `ar_step` and `ch_step`.
    pub fn staff_stats(
        name: impl Into<String>,
        job: StaffStatsJob,
        ar_step: impl Into<String>,
        ch_step: impl Into<String>,
        channels: Vec<u32>,
    ) -> Self {
        Self {
            name: name.into(),
            job: StepJob::StaffStats {
                job,
                ar_step: ar_step.into(),
                ch_step: ch_step.into(),
            },
            channels,
            input_policy: InputPolicy::AtLeastOne,
        }
    }

    /// A generic command step with no inputs and no declared output.
    pub fn command(name: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            name: name.into(),
            job: StepJob::Command {
                spec,
                artifact_inputs: Vec::new(),
                output: None,
            },
            channels: Vec::new(),
            input_policy: InputPolicy::All,
        }
    }

    pub fn with_channels(mut self, channels: Vec<u32>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_input_policy(mut self, policy: InputPolicy) -> Self {
        self.input_policy = policy;
        self
    }

    /// Consumes the artifacts of earlier steps. Only affects command steps.
    pub fn with_artifact_inputs(mut self, inputs: Vec<String>) -> Self {
        if let StepJob::Command { artifact_inputs, .. } = &mut self.job {
            *artifact_inputs = inputs;
        }
        self
    }

    /// Declares an output file. Only affects command steps.
    pub fn with_output(mut self, path: FilePattern, flag: Option<String>) -> Self {
        if let StepJob::Command { output, .. } = &mut self.job {
            *output = Some(StepOutput { path, flag });
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn job(&self) -> &StepJob {
        &self.job
    }

    pub fn channels(&self) -> &[u32] {
        &self.channels
    }

    pub fn input_policy(&self) -> InputPolicy {
        self.input_policy
    }

    /// Executable and fixed options of the step.
    pub fn spec(&self) -> &JobSpec {
        match &self.job {
            StepJob::Segmentation { job, .. } => job.spec(),
            StepJob::StaffStats { job, .. } => job.spec(),
            StepJob::Command { spec, .. } => spec,
        }
    }

    /// Names of earlier steps whose artifacts this step consumes, in
    /// argument order.
    pub fn artifact_inputs(&self) -> Vec<&str> {
        match &self.job {
            StepJob::Segmentation { .. } => Vec::new(),
            StepJob::StaffStats {
                ar_step, ch_step, ..
            } => vec![ar_step.as_str(), ch_step.as_str()],
            StepJob::Command {
                artifact_inputs, ..
            } => artifact_inputs.iter().map(String::as_str).collect(),
        }
    }

    /// Template of the declared output, if any.
    pub fn output_pattern(&self) -> Option<&FilePattern> {
        match &self.job {
            StepJob::Segmentation { map, .. } => Some(map),
            StepJob::StaffStats { .. } => None,
            StepJob::Command { output, .. } => output.as_ref().map(|o| &o.path),
        }
    }

    /// Declared output for the tick at `date`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if the template needs a channel.
    pub fn output_path(&self, date: &DateTime<Utc>) -> Result<Option<PathBuf>, TemplateError> {
        self.output_pattern()
            .map(|pattern| pattern.expand(date, None).map(PathBuf::from))
            .transpose()
    }

    /// Picks the images this step runs on, in channel order.
    ///
    /// Returns the channels without a file as the error when the input policy
    /// is not met.
    pub fn select_images(
        &self,
        resolved: &BTreeMap<u32, Option<PathBuf>>,
    ) -> Result<Vec<PathBuf>, Vec<u32>> {
        let mut images = Vec::with_capacity(self.channels.len());
        let mut missing = Vec::new();
        for channel in &self.channels {
            match resolved.get(channel) {
                Some(Some(path)) => images.push(path.clone()),
                _ => missing.push(*channel),
            }
        }

        let satisfied = match self.input_policy {
            InputPolicy::All => missing.is_empty(),
            InputPolicy::AtLeastOne => self.channels.is_empty() || !images.is_empty(),
        };
        if satisfied {
            Ok(images)
        } else {
            Err(missing)
        }
    }

    /// Builds the arguments of the run for the tick at `date`.
    ///
    /// `artifacts` holds the outputs of [`Self::artifact_inputs`] in the same
    /// order. The declared output is always expanded here, so a step with a
    /// map never runs without its artifact check.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] when the output path cannot be built or an
    /// artifact input is missing.
    pub fn invocation(
        &self,
        date: &DateTime<Utc>,
        images: &[PathBuf],
        artifacts: &[PathBuf],
    ) -> Result<Invocation, SkipReason> {
        let output = self
            .output_path(date)
            .map_err(|e| SkipReason::InvalidOutput(e.to_string()))?;

        match &self.job {
            StepJob::Segmentation { job, map } => {
                let Some(path) = output else {
                    return Err(SkipReason::InvalidOutput(format!(
                        "no map path for '{}'",
                        map.as_str()
                    )));
                };
                Ok(job.invocation(images, &path))
            }
            StepJob::StaffStats {
                job,
                ar_step,
                ch_step,
            } => match artifacts {
                [ar_map, ch_map] => Ok(job.invocation(ar_map, ch_map, images)),
                _ => Err(SkipReason::MissingArtifacts(vec![
                    ar_step.clone(),
                    ch_step.clone(),
                ])),
            },
            StepJob::Command {
                artifact_inputs,
                output: declared,
                ..
            } => {
                if artifacts.len() != artifact_inputs.len() {
                    return Err(SkipReason::MissingArtifacts(artifact_inputs.clone()));
                }
                let mut invocation = Invocation::new();
                if let Some(path) = output {
                    if let Some(StepOutput {
                        flag: Some(flag), ..
                    }) = declared
                    {
                        invocation = invocation.with_option(flag.as_str(), path.to_string_lossy());
                    }
                    invocation = invocation.with_declared_output(path);
                }
                Ok(invocation
                    .with_args(artifacts.iter().cloned())
                    .with_args(images.iter().cloned()))
            }
        }
    }
}
