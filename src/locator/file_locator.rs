//! Candidate file lookup with quality filtering and memoization.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::header::HeaderReader;
use super::pattern::FilePattern;
use crate::error::LocatorError;
use crate::metrics::MetricsCollector;
use crate::quality::{QualityGate, QualityMask};

/// Default keyword holding the quality bits.
pub const DEFAULT_QUALITY_KEYWORD: &str = "QUALITY";

/// Default number of concurrent header lookups.
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 2;

/// Logical key of one lookup.
pub type LookupKey = (DateTime<Utc>, Option<u32>);

/// Finds the first usable file for a date and channel.
///
/// Results are memoized per key for the lifetime of the locator, including
/// "no file" results.
pub struct FileLocator {
    pattern: FilePattern,
    gate: QualityGate,
    reader: Arc<dyn HeaderReader>,
    quality_keyword: String,
    concurrency: usize,
    cache: RwLock<HashMap<LookupKey, Option<PathBuf>>>,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for FileLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLocator")
            .field("pattern", &self.pattern.as_str())
            .field("gate", &self.gate)
            .field("quality_keyword", &self.quality_keyword)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl FileLocator {
    /// Creates a locator with the default keyword and concurrency.
    pub fn new(pattern: FilePattern, gate: QualityGate, reader: Arc<dyn HeaderReader>) -> Self {
        Self {
            pattern,
            gate,
            reader,
            quality_keyword: DEFAULT_QUALITY_KEYWORD.to_string(),
            concurrency: DEFAULT_LOOKUP_CONCURRENCY,
            cache: RwLock::new(HashMap::new()),
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets the header keyword holding the quality bits.
    pub fn with_quality_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.quality_keyword = keyword.into();
        self
    }

    /// Sets the number of concurrent lookups used by [`Self::locate_many`].
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Returns the file pattern.
    pub fn pattern(&self) -> &FilePattern {
        &self.pattern
    }

    /// Returns the quality gate.
    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Returns the memoized result for `key`, if any.
    pub fn cached(&self, key: &LookupKey) -> Option<Option<PathBuf>> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    /// Number of memoized keys.
    pub fn cache_len(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Returns the first good file for `date` and `channel`, or `None`.
    ///
    /// Header reads run on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError`] if the pattern cannot be expanded into a
    /// valid glob. Unreadable candidates are skipped, not reported.
    pub async fn locate(
        &self,
        date: DateTime<Utc>,
        channel: Option<u32>,
    ) -> Result<Option<PathBuf>, LocatorError> {
        let key = (date, channel);
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let glob_pattern = self.pattern.expand(&date, channel)?;
        let reader = Arc::clone(&self.reader);
        let gate = self.gate;
        let keyword = self.quality_keyword.clone();

        let found = tokio::task::spawn_blocking(move || {
            first_good_candidate(&glob_pattern, reader.as_ref(), &gate, &keyword)
        })
        .await
        .map_err(|e| LocatorError::Join(e.to_string()));

        self.finish(key, found.and_then(|r| r))
    }

    /// Looks up several channels for one date with bounded concurrency.
    ///
    /// # Errors
    ///
    /// Returns the first [`LocatorError`] encountered.
    pub async fn locate_many(
        &self,
        date: DateTime<Utc>,
        channels: &[u32],
    ) -> Result<BTreeMap<u32, Option<PathBuf>>, LocatorError> {
        let results: Vec<(u32, Result<Option<PathBuf>, LocatorError>)> =
            stream::iter(channels.iter().copied())
                .map(|channel| async move { (channel, self.locate(date, Some(channel)).await) })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut resolved = BTreeMap::new();
        for (channel, result) in results {
            resolved.insert(channel, result?);
        }
        Ok(resolved)
    }

    fn finish(
        &self,
        key: LookupKey,
        found: Result<Option<PathBuf>, LocatorError>,
    ) -> Result<Option<PathBuf>, LocatorError> {
        match &found {
            Ok(Some(_)) => self.metrics.record_lookup("found"),
            Ok(None) => self.metrics.record_lookup("not_found"),
            Err(_) => self.metrics.record_lookup("error"),
        }

        if let Ok(result) = &found {
            // A concurrent lookup of the same key computes the same value.
            if let Ok(mut cache) = self.cache.write() {
                cache.insert(key, result.clone());
            }
        }
        found
    }
}

/// Globs `pattern`, sorts the matches and returns the first good one.
fn first_good_candidate(
    pattern: &str,
    reader: &dyn HeaderReader,
    gate: &QualityGate,
    keyword: &str,
) -> Result<Option<PathBuf>, LocatorError> {
    let paths = glob::glob(pattern).map_err(|e| LocatorError::InvalidGlob {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut candidates: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable glob entry");
                None
            }
        })
        .collect();
    candidates.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));

    if candidates.is_empty() {
        debug!(pattern = pattern, "No candidate file matches pattern");
        return Ok(None);
    }

    for path in candidates {
        let Some(mask) = read_quality(reader, &path, keyword) else {
            continue;
        };
        if gate.is_good(mask) {
            debug!(path = %path.display(), quality = %mask, "Selected candidate");
            return Ok(Some(path));
        }
        debug!(
            path = %path.display(),
            quality = %mask,
            defects = ?gate.explain(mask),
            "Rejected candidate"
        );
    }

    Ok(None)
}

/// Reads the quality mask of `path`. `None` marks the candidate unusable.
fn read_quality(reader: &dyn HeaderReader, path: &Path, keyword: &str) -> Option<QualityMask> {
    let header = match reader.read_header(path) {
        Ok(header) => header,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read header");
            return None;
        }
    };

    match header.integer(keyword) {
        Ok(Some(value)) => Some(QualityMask::from_header_value(value)),
        Ok(None) => {
            warn!(
                path = %path.display(),
                keyword = keyword,
                "Quality keyword missing, file is considered bad"
            );
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable quality keyword");
            None
        }
    }
}
