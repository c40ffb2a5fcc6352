//! Quality gate for candidate image files.
//!
//! SDO files carry a `QUALITY` header keyword whose bits flag known defects.
//! This module holds the fixed bit table and the evaluation rules used to
//! accept or reject a candidate.

pub mod bits;
mod gate;

pub use bits::{describe, QUALITY_BITS, UNKNOWN_ERROR};
pub use gate::{explain, is_good, IgnoreSet, QualityGate, QualityMask, Verdict, DEFAULT_IGNORE_BITS};
