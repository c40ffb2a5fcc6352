//! Pipeline of dependent external programs run once per tick.
//!
//! # Pipeline Flow
//!
//! 1. **Input selection**: each step picks its images from the files resolved
//!    for the tick, according to its [`InputPolicy`]
//! 2. **Artifacts**: steps consume the declared outputs of earlier steps
//! 3. **Execution**: steps run one after the other through a
//!    [`crate::job::JobRunner`]
//! 4. **Short-circuit**: the first skipped or failed step stops the chain;
//!    every later step is recorded as skipped
//!
//! # Example
//!
//! ```rust,ignore
//! use staff_runner::pipeline::{Pipeline, PipelineStep};
//! use staff_runner::job::{ProcessRunner, SegmentationJob, StaffStatsJob};
//!
//! let pipeline = Pipeline::new(vec![
//!     PipelineStep::segmentation("ar", ar_job, vec![171, 193], ar_map),
//!     PipelineStep::segmentation("ch", ch_job, vec![171, 193], ch_map),
//!     PipelineStep::staff_stats("stats", stats_job, "ar", "ch", channels),
//! ])?;
//!
//! let report = pipeline.run(date, &inputs, &ProcessRunner::new()).await;
//! println!("tick {} succeeded: {}", report.date, report.is_success());
//! ```

mod chain;
mod step;

#[cfg(test)]
pub(crate) use chain::testing;

pub use chain::{Pipeline, ResolvedInputs, SkipReason, StepRecord, StepStatus, TickReport};
pub use step::{InputPolicy, PipelineStep, StepJob, StepOutput};
