//! Immutable description of an external program and its fixed options.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Executable plus the named options shared by every run.
///
/// Options are emitted as `--flag value` pairs sorted by flag name. An option
/// whose value is empty is not emitted at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    executable: PathBuf,
    options: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl JobSpec {
    /// Creates a spec for `executable` with no options.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            options: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Adds a named option.
    pub fn with_option(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(flag.into(), value.into());
        self
    }

    /// Adds several named options.
    pub fn with_options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options
            .extend(options.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Kills the process if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Short name used in logs and errors: the executable file name.
    pub fn name(&self) -> String {
        self.executable
            .file_name()
            .unwrap_or(self.executable.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Builds the argument vector (without the executable) for `invocation`.
    ///
    /// Invocation options override spec options with the same flag.
    pub fn build_args(&self, invocation: &Invocation) -> Vec<OsString> {
        let mut merged: BTreeMap<&str, &str> = self
            .options
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for (flag, value) in &invocation.options {
            merged.insert(flag.as_str(), value.as_str());
        }

        let mut args = Vec::with_capacity(merged.len() * 2 + invocation.positional.len());
        for (flag, value) in merged {
            if value.is_empty() {
                continue;
            }
            args.push(OsString::from(format!("--{}", flag)));
            args.push(OsString::from(value));
        }
        args.extend(invocation.positional.iter().map(|p| p.as_os_str().to_owned()));
        args
    }

    /// Full command line as text, for logs and diagnostics.
    pub fn command_line(&self, invocation: &Invocation) -> Vec<String> {
        std::iter::once(self.executable.to_string_lossy().into_owned())
            .chain(
                self.build_args(invocation)
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned()),
            )
            .collect()
    }
}

/// Per-run arguments of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    options: BTreeMap<String, String>,
    positional: Vec<PathBuf>,
    declared_output: Option<PathBuf>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one positional argument.
    pub fn with_arg(mut self, arg: impl Into<PathBuf>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// Appends positional arguments in order.
    pub fn with_args<I, P>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.positional.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds a per-run named option.
    pub fn with_option(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(flag.into(), value.into());
        self
    }

    /// Declares a file the run must produce to count as successful.
    pub fn with_declared_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.declared_output = Some(path.into());
        self
    }

    pub fn positional(&self) -> &[PathBuf] {
        &self.positional
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn declared_output(&self) -> Option<&Path> {
        self.declared_output.as_deref()
    }
}
