//! Running external programs and classifying their outcome.
//!
//! A run is successful only when the process exits with code 0 and, if the
//! invocation declares an output file, that file exists afterwards. Runs are
//! never retried here.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, error};

use super::spec::{Invocation, JobSpec};
use crate::error::JobError;

/// Outcome of one external program run.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Executable name, as reported in errors.
    pub executable: String,
    /// Full command line.
    pub argv: Vec<String>,
    /// Exit code, `None` if the process never exited normally.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub declared_output: Option<PathBuf>,
    /// Why the run failed, `None` on success.
    pub error: Option<JobError>,
}

impl JobResult {
    /// Returns true if the run passed every check.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into a `Result`, keeping the full record on success.
    pub fn into_result(self) -> Result<Self, JobError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Something that can run a [`JobSpec`].
///
/// The scheduler only talks to this trait, so tests can substitute a runner
/// that never spawns a process.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Runs `spec` with `invocation` and classifies the outcome.
    async fn run(&self, spec: &JobSpec, invocation: &Invocation) -> JobResult;
}

/// Runs jobs as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, spec: &JobSpec, invocation: &Invocation) -> JobResult {
        let executable = spec.name();
        let argv = spec.command_line(invocation);
        let declared_output = invocation.declared_output().map(Path::to_path_buf);

        debug!(command = %argv.join(" "), "Running job");

        let mut cmd = Command::new(spec.executable());
        cmd.args(spec.build_args(invocation))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut result = JobResult {
            executable: executable.clone(),
            argv,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            declared_output,
            error: None,
        };

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                result.error = Some(JobError::Spawn {
                    executable,
                    message: e.to_string(),
                });
                log_failure(&result);
                return result;
            }
        };

        // Streams are drained in their own tasks so `child.wait()` can borrow
        // the child mutably.
        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));
        let stdout_abort = stdout_task.abort_handle();
        let stderr_abort = stderr_task.abort_handle();

        // The deadline covers the pipes too: a background grandchild can keep
        // them open long after the child exited.
        let completion = async {
            let status = child.wait().await;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            (status, stdout, stderr)
        };
        let finished = match spec.timeout() {
            Some(limit) => tokio::time::timeout(limit, completion).await.ok(),
            None => Some(completion.await),
        };

        result.duration = start.elapsed();
        result.error = match finished {
            None => {
                let _ = child.kill().await;
                stdout_abort.abort();
                stderr_abort.abort();
                Some(JobError::TimedOut {
                    executable: result.executable.clone(),
                    timeout: spec.timeout().unwrap_or_default(),
                })
            }
            Some((Err(e), stdout, stderr)) => {
                result.stdout = stdout;
                result.stderr = stderr;
                Some(JobError::Spawn {
                    executable: result.executable.clone(),
                    message: format!("failed waiting for process: {}", e),
                })
            }
            Some((Ok(status), stdout, stderr)) => {
                result.stdout = stdout;
                result.stderr = stderr;
                result.exit_code = status.code();
                classify(&result, status)
            }
        };

        if result.is_success() {
            debug!(
                executable = %result.executable,
                duration_secs = result.duration.as_secs_f64(),
                "Job succeeded"
            );
        } else {
            log_failure(&result);
        }
        result
    }
}

/// Applies the exit status and declared output checks.
fn classify(result: &JobResult, status: ExitStatus) -> Option<JobError> {
    let executable = result.executable.clone();
    match status.code() {
        None => Some(JobError::Terminated {
            executable,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
        }),
        Some(0) => match &result.declared_output {
            Some(path) if !path.is_file() => Some(JobError::MissingArtifact {
                executable,
                path: path.clone(),
                stdout: result.stdout.clone(),
                stderr: result.stderr.clone(),
            }),
            _ => None,
        },
        Some(code) => Some(JobError::NonZeroExit {
            executable,
            code,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
        }),
    }
}

fn log_failure(result: &JobResult) {
    if let Some(err) = &result.error {
        error!(
            executable = %result.executable,
            command = %result.argv.join(" "),
            exit_code = ?result.exit_code,
            kind = err.kind(),
            stdout = %result.stdout,
            stderr = %result.stderr,
            "Job failed: {}",
            err
        );
    }
}

/// Reads a whole output stream as lossy UTF-8.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn sh(script: &str) -> (JobSpec, Invocation) {
        (
            JobSpec::new("/bin/sh"),
            Invocation::new().with_args(["-c", script, "sh"]),
        )
    }

    #[tokio::test]
    async fn test_exit_zero_with_artifact_succeeds() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("map.fits");
        let (spec, inv) = sh("echo segmenting; touch \"$1\"");
        let inv = inv.with_arg(&out).with_declared_output(&out);

        let result = ProcessRunner::new().run(&spec, &inv).await;
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "segmenting");
        assert_eq!(result.executable, "sh");
    }

    #[tokio::test]
    async fn test_exit_zero_without_artifact_fails() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("map.fits");
        let (spec, inv) = sh("echo done");
        let inv = inv.with_declared_output(&out);

        let result = ProcessRunner::new().run(&spec, &inv).await;
        assert_eq!(result.exit_code, Some(0));
        assert_matches!(
            result.into_result(),
            Err(JobError::MissingArtifact { path, .. }) if path == out
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_even_with_artifact() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("map.fits");
        std::fs::write(&out, b"stale").unwrap();
        let (spec, inv) = sh("echo broken >&2; exit 3");
        let inv = inv.with_declared_output(&out);

        let result = ProcessRunner::new().run(&spec, &inv).await;
        assert_eq!(result.exit_code, Some(3));
        assert_matches!(
            result.error,
            Some(JobError::NonZeroExit { code: 3, ref stderr, .. }) if stderr.trim() == "broken"
        );
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let spec = JobSpec::new("/nonexistent/classification.x");
        let result = ProcessRunner::new().run(&spec, &Invocation::new()).await;
        assert_matches!(result.error, Some(JobError::Spawn { .. }));
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let spec = JobSpec::new("/bin/sh").with_timeout(Duration::from_millis(200));
        let inv = Invocation::new().with_args(["-c", "exec sleep 5"]);

        let result = ProcessRunner::new().run(&spec, &inv).await;
        assert_matches!(result.error, Some(JobError::TimedOut { .. }));
        assert!(result.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_covers_pipes_held_by_background_process() {
        let spec = JobSpec::new("/bin/sh").with_timeout(Duration::from_millis(500));
        let inv = Invocation::new().with_args(["-c", "sleep 6 & echo started"]);

        let started = Instant::now();
        let result = ProcessRunner::new().run(&spec, &inv).await;
        assert_matches!(result.error, Some(JobError::TimedOut { .. }));
        assert!(!result.is_success());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_large_output_captured_in_full() {
        let (spec, inv) = sh("i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done");
        let result = ProcessRunner::new().run(&spec, &inv).await;
        assert!(result.is_success());
        assert_eq!(result.stdout.lines().count(), 20000);
    }
}
