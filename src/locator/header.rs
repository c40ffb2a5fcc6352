//! FITS header access.
//!
//! Only header cards are read. Data units of HDUs before the requested one are
//! skipped by seeking past them, so lookups stay cheap even for large files.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::HeaderError;

/// FITS logical record length.
pub const BLOCK_SIZE: usize = 2880;

/// FITS header card length.
pub const CARD_SIZE: usize = 80;

/// Keyword to raw value mapping for one HDU.
///
/// String values are stored without their quotes; other values are stored as
/// written, without the trailing comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    cards: HashMap<String, String>,
}

impl Header {
    /// Creates an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `keyword` to `value`.
    pub fn insert(&mut self, keyword: impl Into<String>, value: impl Into<String>) {
        self.cards.insert(keyword.into(), value.into());
    }

    /// Returns the raw value of `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.cards.get(keyword).map(String::as_str)
    }

    /// Returns true if `keyword` is present.
    pub fn contains(&self, keyword: &str) -> bool {
        self.cards.contains_key(keyword)
    }

    /// Returns the value of `keyword` parsed as an integer, if present.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::NotAnInteger`] if the value does not parse.
    pub fn integer(&self, keyword: &str) -> Result<Option<i64>, HeaderError> {
        let Some(raw) = self.get(keyword) else {
            return Ok(None);
        };
        parse_integer(raw)
            .map(Some)
            .ok_or_else(|| HeaderError::NotAnInteger {
                keyword: keyword.to_string(),
                value: raw.to_string(),
            })
    }

    /// Number of cards with a value.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Returns true if no card carries a value.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Reads the metadata of a candidate file.
///
/// Implementations are called from blocking worker threads and must be
/// shareable across them.
pub trait HeaderReader: Send + Sync {
    /// Reads the header of `path`.
    fn read_header(&self, path: &Path) -> Result<Header, HeaderError>;
}

/// Reads the header of one HDU of a FITS file.
#[derive(Debug, Clone, Copy)]
pub struct FitsHeaderReader {
    hdu: usize,
}

impl FitsHeaderReader {
    /// Creates a reader for HDU `hdu` (0 is the primary HDU).
    pub fn new(hdu: usize) -> Self {
        Self { hdu }
    }

    /// Returns the HDU index this reader targets.
    pub fn hdu(&self) -> usize {
        self.hdu
    }
}

impl Default for FitsHeaderReader {
    /// SDO level 1 files keep the image and its keywords in HDU 1.
    fn default() -> Self {
        Self::new(1)
    }
}

impl HeaderReader for FitsHeaderReader {
    fn read_header(&self, path: &Path) -> Result<Header, HeaderError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut index = 0usize;

        loop {
            let header = match read_hdu_header(&mut reader, path, index == 0)? {
                Some(header) => header,
                None => {
                    return Err(HeaderError::HduNotFound {
                        path: path.to_path_buf(),
                        hdu: self.hdu,
                    })
                }
            };

            if index == self.hdu {
                return Ok(header);
            }

            let data_len = padded(data_unit_size(&header, path)?);
            let offset = i64::try_from(data_len).map_err(|_| HeaderError::Malformed {
                path: path.to_path_buf(),
                reason: format!("data unit of HDU {} is too large", index),
            })?;
            reader.seek(SeekFrom::Current(offset))?;
            index += 1;
        }
    }
}

/// Reads one header unit. Returns `None` on a clean end of file.
fn read_hdu_header<R: Read>(
    reader: &mut R,
    path: &Path,
    primary: bool,
) -> Result<Option<Header>, HeaderError> {
    let mut header = Header::new();
    let mut block = [0u8; BLOCK_SIZE];
    let mut first = true;

    loop {
        if !read_block(reader, &mut block)? {
            if first {
                if primary {
                    return Err(HeaderError::NotFits(path.to_path_buf()));
                }
                return Ok(None);
            }
            return Err(HeaderError::Malformed {
                path: path.to_path_buf(),
                reason: "end of file before END card".to_string(),
            });
        }

        for card in block.chunks(CARD_SIZE) {
            let card = String::from_utf8_lossy(card);
            let keyword = card.get(..8).unwrap_or(&card).trim_end();

            if first {
                let expected = if primary { "SIMPLE" } else { "XTENSION" };
                if keyword != expected {
                    if primary {
                        return Err(HeaderError::NotFits(path.to_path_buf()));
                    }
                    return Err(HeaderError::Malformed {
                        path: path.to_path_buf(),
                        reason: format!("extension header starts with '{}'", keyword),
                    });
                }
                first = false;
            }

            if keyword == "END" {
                return Ok(Some(header));
            }

            if let Some(value) = card_value(&card) {
                header.insert(keyword, value);
            }
        }
    }
}

/// Fills `block`. Returns false if the stream ended before any byte was read.
fn read_block<R: Read>(reader: &mut R, block: &mut [u8; BLOCK_SIZE]) -> Result<bool, HeaderError> {
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        let n = reader.read(&mut block[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    match filled {
        0 => Ok(false),
        BLOCK_SIZE => Ok(true),
        _ => Err(HeaderError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated FITS block",
        ))),
    }
}

/// Extracts the value of a `KEYWORD = value / comment` card.
fn card_value(card: &str) -> Option<String> {
    if card.get(8..10) != Some("= ") {
        return None;
    }
    let rest = card.get(10..)?.trim_start();

    if let Some(quoted) = rest.strip_prefix('\'') {
        // Doubled quotes are an escaped quote.
        let mut value = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                    continue;
                }
                break;
            }
            value.push(c);
        }
        return Some(value.trim_end().to_string());
    }

    let value = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    Some(value.trim().to_string())
}

fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    // Some writers emit integral reals such as `256.0`.
    let value = raw.replace(['D', 'd'], "E").parse::<f64>().ok()?;
    (value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

/// Size in bytes of the data unit described by `header`, before padding.
fn data_unit_size(header: &Header, path: &Path) -> Result<u64, HeaderError> {
    let required = |keyword: &str| -> Result<i64, HeaderError> {
        header.integer(keyword)?.ok_or_else(|| HeaderError::Malformed {
            path: path.to_path_buf(),
            reason: format!("missing mandatory keyword {}", keyword),
        })
    };

    let bitpix = required("BITPIX")?;
    let naxis = required("NAXIS")?;
    if naxis == 0 {
        return Ok(0);
    }

    let mut elements: u64 = 1;
    for axis in 1..=naxis {
        let len = required(&format!("NAXIS{}", axis))?;
        elements = elements.saturating_mul(len.max(0) as u64);
    }

    let pcount = header.integer("PCOUNT")?.unwrap_or(0).max(0) as u64;
    let gcount = header.integer("GCOUNT")?.unwrap_or(1).max(0) as u64;
    let bits = bitpix
        .unsigned_abs()
        .saturating_mul(gcount)
        .saturating_mul(pcount.saturating_add(elements));
    Ok(bits / 8)
}

fn padded(len: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    len.div_ceil(block) * block
}

#[cfg(test)]
pub(crate) mod testing {
    //! Synthetic FITS files for tests.

    use super::{BLOCK_SIZE, CARD_SIZE};
    use std::path::Path;

    fn card(text: &str) -> Vec<u8> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(CARD_SIZE, b' ');
        bytes
    }

    fn keyword_card(keyword: &str, value: &str) -> Vec<u8> {
        card(&format!("{:<8}= {:>20}", keyword, value))
    }

    fn pad(bytes: &mut Vec<u8>, fill: u8) {
        let rem = bytes.len() % BLOCK_SIZE;
        if rem != 0 {
            bytes.resize(bytes.len() + BLOCK_SIZE - rem, fill);
        }
    }

    /// Builds a compressed-image style file: an empty primary HDU followed
    /// by a small image extension carrying `QUALITY` when given.
    pub fn fits_bytes(quality: Option<i64>) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(keyword_card("SIMPLE", "T"));
        bytes.extend(keyword_card("BITPIX", "16"));
        bytes.extend(keyword_card("NAXIS", "2"));
        bytes.extend(keyword_card("NAXIS1", "40"));
        bytes.extend(keyword_card("NAXIS2", "40"));
        bytes.extend(card("END"));
        pad(&mut bytes, b' ');
        // 40 * 40 * 2 bytes of primary data.
        bytes.extend(vec![0u8; 3200]);
        pad(&mut bytes, 0);

        bytes.extend(card("XTENSION= 'IMAGE   '           / image extension"));
        bytes.extend(keyword_card("BITPIX", "-32"));
        bytes.extend(keyword_card("NAXIS", "1"));
        bytes.extend(keyword_card("NAXIS1", "4"));
        bytes.extend(keyword_card("PCOUNT", "0"));
        bytes.extend(keyword_card("GCOUNT", "1"));
        bytes.extend(card("TELESCOP= 'SDO/AIA '           / telescope"));
        if let Some(q) = quality {
            bytes.extend(card(&format!("{:<8}= {:>20} / quality bits", "QUALITY", q)));
        }
        bytes.extend(card("COMMENT a comment card"));
        bytes.extend(card("END"));
        pad(&mut bytes, b' ');
        bytes.extend(vec![0u8; 16]);
        pad(&mut bytes, 0);
        bytes
    }

    pub fn write_fits(path: &Path, quality: Option<i64>) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, fits_bytes(quality)).unwrap();
    }
}
