//! Quality bitmask evaluation.
//!
//! A candidate file is good when its quality mask is exactly zero once the
//! operator-tolerated bits have been cleared.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::bits::{describe, IMAGE_NOT_AVAILABLE_BIT};
use crate::error::QualityError;

/// Bits tolerated when no ignore list is configured.
pub const DEFAULT_IGNORE_BITS: [u8; 6] = [0, 1, 2, 3, 4, 8];

/// Quality bitfield read from a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualityMask(u32);

impl QualityMask {
    /// Creates a mask from its raw bits.
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Creates a mask from a header integer.
    ///
    /// FITS stores `QUALITY` as a signed 32-bit integer, so a mask with bit 31
    /// set arrives as a negative number. The low 32 bits are kept as-is.
    pub fn from_header_value(value: i64) -> Self {
        Self(value as u32)
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if `bit` is set.
    pub fn is_set(&self, bit: u8) -> bool {
        bit < 32 && self.0 & (1 << bit) != 0
    }

    /// Returns the set bit positions in ascending order.
    pub fn set_bits(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..32).filter(move |bit| self.is_set(*bit))
    }

    /// Returns a copy with every bit of `ignore` cleared.
    pub fn without(&self, ignore: &IgnoreSet) -> Self {
        Self(self.0 & !ignore.bits())
    }

    /// Returns true if no bit is set.
    pub fn is_clear(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for QualityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Set of quality bits the operator has chosen to tolerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IgnoreSet(u32);

impl IgnoreSet {
    /// An ignore set that tolerates nothing.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds an ignore set from bit positions.
    ///
    /// # Errors
    ///
    /// Returns [`QualityError::InvalidBit`] for any position above 31.
    pub fn new<I>(bits: I) -> Result<Self, QualityError>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut mask = 0u32;
        for bit in bits {
            if bit > 31 {
                return Err(QualityError::InvalidBit(bit));
            }
            mask |= 1 << bit;
        }
        Ok(Self(mask))
    }

    /// Returns true if `bit` is tolerated.
    pub fn contains(&self, bit: u8) -> bool {
        bit < 32 && self.0 & (1 << bit) != 0
    }

    /// Returns the tolerated bits as a mask.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if the "image not available" bit would be tolerated.
    pub fn tolerates_missing_image(&self) -> bool {
        self.contains(IMAGE_NOT_AVAILABLE_BIT)
    }

    /// Returns the tolerated bit positions in ascending order.
    pub fn positions(&self) -> Vec<u8> {
        (0u8..32).filter(|bit| self.contains(*bit)).collect()
    }
}

impl Default for IgnoreSet {
    fn default() -> Self {
        let mask = DEFAULT_IGNORE_BITS
            .iter()
            .fold(0u32, |acc, bit| acc | (1 << bit));
        Self(mask)
    }
}

/// Returns true if `mask` is zero once the bits of `ignore` are cleared.
pub fn is_good(mask: QualityMask, ignore: &IgnoreSet) -> bool {
    mask.without(ignore).is_clear()
}

/// Describes every set bit of `mask`, one entry per bit in ascending order.
///
/// Reserved positions are reported as [`super::UNKNOWN_ERROR`]. Callers that
/// want the post-ignore explanation pass `mask.without(ignore)`.
pub fn explain(mask: QualityMask) -> Vec<&'static str> {
    mask.set_bits().map(describe).collect()
}

/// Outcome of assessing a mask against an ignore set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No bit is set at all.
    Good,
    /// Only tolerated bits are set. Carries their descriptions.
    GoodWithIgnored(Vec<&'static str>),
    /// At least one untolerated bit is set. Carries the untolerated descriptions.
    Bad(Vec<&'static str>),
}

impl Verdict {
    /// Returns true for both good variants.
    pub fn is_good(&self) -> bool {
        !matches!(self, Verdict::Bad(_))
    }
}

/// Decides whether a candidate file is usable.
///
/// The gate is immutable once constructed; every evaluation is pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    ignore: IgnoreSet,
}

impl QualityGate {
    /// Creates a gate tolerating the bits of `ignore`.
    pub fn new(ignore: IgnoreSet) -> Self {
        Self { ignore }
    }

    /// Returns the configured ignore set.
    pub fn ignore_set(&self) -> &IgnoreSet {
        &self.ignore
    }

    /// Returns true if `mask` is acceptable.
    pub fn is_good(&self, mask: QualityMask) -> bool {
        is_good(mask, &self.ignore)
    }

    /// Describes the untolerated defects of `mask`.
    pub fn explain(&self, mask: QualityMask) -> Vec<&'static str> {
        explain(mask.without(&self.ignore))
    }

    /// Classifies `mask` into a [`Verdict`].
    pub fn assess(&self, mask: QualityMask) -> Verdict {
        if mask.is_clear() {
            Verdict::Good
        } else if self.is_good(mask) {
            Verdict::GoodWithIgnored(explain(mask))
        } else {
            Verdict::Bad(self.explain(mask))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::bits::UNKNOWN_ERROR;

    #[test]
    fn test_ignored_bit_zero_is_good() {
        let mask = QualityMask::new(0b1);
        let ignore = IgnoreSet::new([0]).unwrap();
        assert!(is_good(mask, &ignore));
    }

    #[test]
    fn test_unignored_bit_zero_is_bad_and_explained() {
        let mask = QualityMask::new(0b1);
        let ignore = IgnoreSet::empty();
        assert!(!is_good(mask, &ignore));
        assert_eq!(
            explain(mask),
            vec!["FLAT_REC == MISSING (Flatfield data not available)"]
        );
    }

    #[test]
    fn test_is_good_matches_cleared_mask_for_many_inputs() {
        let masks = [0u32, 1, 0x100, 0x8000_0000, 0xFFFF_FFFF, 0x4000_011F, 0x0020_0000];
        let ignores = [
            IgnoreSet::empty(),
            IgnoreSet::default(),
            IgnoreSet::new([31, 30]).unwrap(),
            IgnoreSet::new(0u8..32).unwrap(),
        ];
        for raw in masks {
            for ignore in &ignores {
                let mask = QualityMask::new(raw);
                assert_eq!(is_good(mask, ignore), raw & !ignore.bits() == 0);
            }
        }
    }

    #[test]
    fn test_ignore_set_order_independent() {
        let a = IgnoreSet::new([8, 0, 3]).unwrap();
        let b = IgnoreSet::new([3, 8, 0, 0]).unwrap();
        assert_eq!(a, b);
        let mask = QualityMask::new(0x109);
        assert_eq!(is_good(mask, &a), is_good(mask, &b));
    }

    #[test]
    fn test_explain_one_entry_per_set_bit() {
        // Bits 5, 6 and 22 are reserved.
        let mask = QualityMask::new((1 << 5) | (1 << 6) | (1 << 22) | (1 << 31));
        let explained = explain(mask);
        assert_eq!(explained.len(), 4);
        assert_eq!(explained[0], UNKNOWN_ERROR);
        assert_eq!(explained[1], UNKNOWN_ERROR);
        assert_eq!(explained[2], UNKNOWN_ERROR);
        assert_eq!(explained[3], "Image not available");
    }

    #[test]
    fn test_explain_is_idempotent() {
        let gate = QualityGate::new(IgnoreSet::default());
        let mask = QualityMask::new(0x0000_1101);
        assert_eq!(gate.explain(mask), gate.explain(mask));
        assert_eq!(gate.is_good(mask), gate.is_good(mask));
        assert_eq!(mask.bits(), 0x0000_1101);
    }

    #[test]
    fn test_invalid_bit_rejected() {
        assert_eq!(IgnoreSet::new([32]), Err(QualityError::InvalidBit(32)));
    }

    #[test]
    fn test_default_does_not_tolerate_missing_image() {
        let ignore = IgnoreSet::default();
        assert!(!ignore.tolerates_missing_image());
        assert_eq!(ignore.positions(), vec![0, 1, 2, 3, 4, 8]);
        assert!(!is_good(QualityMask::new(1 << 31), &ignore));
    }

    #[test]
    fn test_header_value_keeps_bit_31() {
        let mask = QualityMask::from_header_value(-2_147_483_648);
        assert!(mask.is_set(31));
        assert_eq!(mask.set_bits().count(), 1);
    }

    #[test]
    fn test_assess_verdicts() {
        let gate = QualityGate::default();
        assert_eq!(gate.assess(QualityMask::new(0)), Verdict::Good);
        assert_eq!(
            gate.assess(QualityMask::new(1 << 8)),
            Verdict::GoodWithIgnored(vec!["MISSVALS > 0"])
        );
        let bad = gate.assess(QualityMask::new((1 << 8) | (1 << 9)));
        assert_eq!(bad, Verdict::Bad(vec!["MISSVALS > 0.01*TOTVALS"]));
        assert!(!bad.is_good());
    }

    #[test]
    fn test_mask_display() {
        assert_eq!(QualityMask::new(0x100).to_string(), "0x00000100");
    }
}
