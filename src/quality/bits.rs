//! Fixed table of SDO quality bit descriptions.
//!
//! The same table is used by the gate and by every report that explains why
//! a file was rejected.

/// Description used for set bits whose table entry is reserved.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Bit that marks an image that is not available at all.
pub const IMAGE_NOT_AVAILABLE_BIT: u8 = 31;

/// Bit that marks a quicklook (not definitive) image.
pub const QUICKLOOK_BIT: u8 = 30;

/// Defect description for each bit of the `QUALITY` keyword. Empty entries
/// are reserved positions.
pub const QUALITY_BITS: [&str; 32] = [
    "FLAT_REC == MISSING (Flatfield data not available)",
    "ORB_REC == MISSING (Orbit data not available)",
    "ASD_REC == MISSING (Ancillary Science Data not available)",
    "MPO_REC == MISSING (Master pointing data not available)",
    "RSUN_LF == MISSING or X0_LF == MISSING or Y0_LF == MISSING (HMI Limb fit not acceptable)",
    "",
    "",
    "",
    "MISSVALS > 0",
    "MISSVALS > 0.01*TOTVALS",
    "MISSVALS > 0.05*TOTVALS",
    "MISSVALS > 0.25*TOTVALS",
    "ACS_MODE != \"SCIENCE\" (Spacecraft not in science pointing mode)",
    "ACS_ECLP == \"YES\" (Spacecraft eclipse flag set)",
    "ACS_SUNP == \"NO\" (Spacecraft sun presence flag not set)",
    "ACS_SAFE == \"YES\" (Spacecraft safemode flag set)",
    "IMG_TYPE == \"DARK\" (Dark image)",
    "HWLTNSET == \"OPEN\" or AISTATE == \"OPEN\" (HMI ISS loop open or AIA ISS loop Open)",
    "(FID >= 1 and FID <= 9999) or (AIFTSID >= 0xC000) (HMI Calibration Image or AIA Calibration Image)",
    "HCFTID == 17 (HMI CAL mode image)",
    "(AIFCPS <= -20 or AIFCPS >= 100) (AIA focus out of range)",
    "AIAGP6 != 0 (AIA register flag)",
    "",
    "",
    "",
    "",
    "",
    "",
    "",
    "",
    "Quicklook image",
    "Image not available",
];

/// Returns the description of `bit`, or [`UNKNOWN_ERROR`] for reserved or
/// out-of-range positions.
pub fn describe(bit: u8) -> &'static str {
    match QUALITY_BITS.get(bit as usize) {
        Some(desc) if !desc.is_empty() => desc,
        _ => UNKNOWN_ERROR,
    }
}
