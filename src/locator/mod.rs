//! Candidate file discovery.
//!
//! A [`FilePattern`] is expanded for a date and channel into a glob. The
//! matches are sorted by path and the first one whose header passes the
//! [`crate::quality::QualityGate`] is returned.

mod file_locator;
pub mod header;
pub mod pattern;

pub use file_locator::{
    FileLocator, LookupKey, DEFAULT_LOOKUP_CONCURRENCY, DEFAULT_QUALITY_KEYWORD,
};
pub use header::{FitsHeaderReader, Header, HeaderReader};
pub use pattern::FilePattern;
