//! Resumable scheduler state.
//!
//! The record is a small versioned JSON document. Writes go to a temporary
//! file in the same directory which is then renamed over the target, so a
//! crash leaves either the old or the new record on disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::failure::FailureCounter;
use crate::error::StateError;

/// Current layout version of the state file.
pub const STATE_VERSION: u32 = 1;

/// What survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    /// Logical date of the next tick.
    pub cursor: DateTime<Utc>,
    #[serde(default)]
    pub failure_count: FailureCounter,
    pub updated_at: DateTime<Utc>,
}

impl PersistedState {
    pub fn new(cursor: DateTime<Utc>, failure_count: FailureCounter) -> Self {
        Self {
            version: STATE_VERSION,
            cursor,
            failure_count,
            updated_at: Utc::now(),
        }
    }
}

/// File-backed store for [`PersistedState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record. A missing file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the file cannot be read, does not parse, or
    /// has an unknown version.
    pub fn load(&self) -> Result<Option<PersistedState>, StateError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: PersistedState = serde_json::from_str(&text)?;
        if state.version != STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: state.version,
                expected: STATE_VERSION,
            });
        }
        Ok(Some(state))
    }

    /// Reads the record, falling back to `default_cursor` and a zero counter
    /// when the file is absent or unusable.
    pub fn load_or(&self, default_cursor: DateTime<Utc>) -> PersistedState {
        match self.load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::info!(
                    path = %self.path.display(),
                    cursor = %default_cursor,
                    "No saved state, starting from configured date"
                );
                PersistedState::new(default_cursor, FailureCounter::default())
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    cursor = %default_cursor,
                    "Unusable saved state, starting from configured date"
                );
                PersistedState::new(default_cursor, FailureCounter::default())
            }
        }
    }

    /// Atomically replaces the record.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the temporary file cannot be written or
    /// renamed.
    pub fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StateError::Persist {
            path: self.path.clone(),
            message: e.error.to_string(),
        })?;
        Ok(())
    }
}
