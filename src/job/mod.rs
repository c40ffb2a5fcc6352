//! External program invocation.
//!
//! - [`JobSpec`]: immutable executable plus named options
//! - [`Invocation`]: positional arguments and the declared output of one run
//! - [`JobRunner`] / [`ProcessRunner`]: run a spec and classify the outcome
//! - [`staff`]: presets for the segmentation and STAFF statistics programs

mod runner;
mod spec;
pub mod staff;

pub use runner::{JobResult, JobRunner, ProcessRunner};
pub use spec::{Invocation, JobSpec};
pub use staff::{
    SegmentationJob, StaffStatsJob, CENTERS_OPTION, CONFIG_OPTION, OUTPUT_OPTION,
};
