//! Job presets for the SPoCA / STAFF tool suite.
//!
//! Two executables are driven by the scheduler:
//!
//! - the classification program, which segments a set of images into an
//!   active region or coronal hole map
//! - the STAFF statistics program, which extracts region statistics from an
//!   AR map, a CH map and the images of every channel

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::runner::{JobResult, JobRunner};
use super::spec::{Invocation, JobSpec};
use crate::error::JobError;

/// Option naming the segmentation map or the statistics directory.
pub const OUTPUT_OPTION: &str = "output";

/// Option naming the tool configuration file.
pub const CONFIG_OPTION: &str = "config";

/// Option naming the class centers file of the segmentation.
pub const CENTERS_OPTION: &str = "centersFile";

/// Runs the classification program to produce one segmentation map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationJob {
    spec: JobSpec,
}

impl SegmentationJob {
    pub fn new(
        executable: impl Into<PathBuf>,
        config_file: impl Into<String>,
        centers_file: impl Into<String>,
    ) -> Self {
        Self {
            spec: JobSpec::new(executable)
                .with_option(CONFIG_OPTION, config_file)
                .with_option(CENTERS_OPTION, centers_file),
        }
    }

    /// Adds options beyond the config and centers files.
    pub fn with_extra_options(mut self, options: BTreeMap<String, String>) -> Self {
        self.spec = self.spec.with_options(options);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.spec = self.spec.with_timeout(timeout);
        self
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// Images are positional; the map path is passed as `--output` and must
    /// exist after the run.
    pub fn invocation(&self, images: &[PathBuf], output_file: &Path) -> Invocation {
        Invocation::new()
            .with_option(OUTPUT_OPTION, output_file.to_string_lossy())
            .with_args(images.iter().cloned())
            .with_declared_output(output_file)
    }

    /// Segments `images` into `output_file`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] on a non-zero exit or if the map was not written.
    pub async fn execute(
        &self,
        runner: &dyn JobRunner,
        images: &[PathBuf],
        output_file: &Path,
    ) -> Result<JobResult, JobError> {
        runner
            .run(&self.spec, &self.invocation(images, output_file))
            .await
            .into_result()
    }
}

/// Runs the STAFF statistics program over an AR map and a CH map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffStatsJob {
    spec: JobSpec,
}

impl StaffStatsJob {
    pub fn new(
        executable: impl Into<PathBuf>,
        config_file: impl Into<String>,
        output_directory: impl Into<String>,
    ) -> Self {
        Self {
            spec: JobSpec::new(executable)
                .with_option(CONFIG_OPTION, config_file)
                .with_option(OUTPUT_OPTION, output_directory),
        }
    }

    pub fn with_extra_options(mut self, options: BTreeMap<String, String>) -> Self {
        self.spec = self.spec.with_options(options);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.spec = self.spec.with_timeout(timeout);
        self
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// Positional arguments are the AR map, the CH map, then the images.
    pub fn invocation(&self, ar_map: &Path, ch_map: &Path, images: &[PathBuf]) -> Invocation {
        Invocation::new()
            .with_arg(ar_map)
            .with_arg(ch_map)
            .with_args(images.iter().cloned())
    }

    /// Extracts statistics for `images` using both maps.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] on a non-zero exit.
    pub async fn execute(
        &self,
        runner: &dyn JobRunner,
        ar_map: &Path,
        ch_map: &Path,
        images: &[PathBuf],
    ) -> Result<JobResult, JobError> {
        runner
            .run(&self.spec, &self.invocation(ar_map, ch_map, images))
            .await
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ProcessRunner;
    use assert_matches::assert_matches;

    #[test]
    fn test_segmentation_command_line() {
        let job = SegmentationJob::new(
            "/opt/spoca/bin/classification.x",
            "/etc/spoca/AR.config",
            "/var/spoca/AR.centers",
        );
        let inv = job.invocation(
            &[PathBuf::from("/data/171.fits"), PathBuf::from("/data/193.fits")],
            Path::new("/maps/20151016_060000.SegmentedMap.fits"),
        );

        assert_eq!(
            job.spec().command_line(&inv),
            vec![
                "/opt/spoca/bin/classification.x",
                "--centersFile",
                "/var/spoca/AR.centers",
                "--config",
                "/etc/spoca/AR.config",
                "--output",
                "/maps/20151016_060000.SegmentedMap.fits",
                "/data/171.fits",
                "/data/193.fits",
            ]
        );
        assert_eq!(
            inv.declared_output(),
            Some(Path::new("/maps/20151016_060000.SegmentedMap.fits"))
        );
    }

    #[test]
    fn test_staff_stats_command_line() {
        let job = StaffStatsJob::new("get_STAFF_stats.x", "stats.config", "/stats");
        let inv = job.invocation(
            Path::new("ar.fits"),
            Path::new("ch.fits"),
            &[PathBuf::from("94.fits"), PathBuf::from("131.fits")],
        );

        assert_eq!(
            job.spec().command_line(&inv),
            vec![
                "get_STAFF_stats.x",
                "--config",
                "stats.config",
                "--output",
                "/stats",
                "ar.fits",
                "ch.fits",
                "94.fits",
                "131.fits",
            ]
        );
        assert_eq!(inv.declared_output(), None);
    }

    #[tokio::test]
    async fn test_segmentation_missing_map_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        // `true` ignores its arguments and writes nothing.
        let job = SegmentationJob::new("true", "", "");
        let out = dir.path().join("map.fits");

        let result = job.execute(&ProcessRunner::new(), &[], &out).await;
        assert_matches!(result, Err(JobError::MissingArtifact { .. }));
    }

    #[tokio::test]
    async fn test_staff_stats_exit_code_checked() {
        let job = StaffStatsJob::new("false", "", "");
        let result = job
            .execute(&ProcessRunner::new(), Path::new("ar"), Path::new("ch"), &[])
            .await;
        assert_matches!(result, Err(JobError::NonZeroExit { code: 1, .. }));
    }
}
