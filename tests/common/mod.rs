//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

const BLOCK: usize = 2880;
const CARD: usize = 80;

fn card(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(CARD, b' ');
    bytes
}

fn value_card(keyword: &str, value: &str) -> Vec<u8> {
    card(&format!("{:<8}= {:>20}", keyword, value))
}

fn pad(bytes: &mut Vec<u8>, fill: u8) {
    let rem = bytes.len() % BLOCK;
    if rem != 0 {
        bytes.resize(bytes.len() + BLOCK - rem, fill);
    }
}

/// Writes an AIA-like file: an empty primary HDU and an image extension
/// carrying `QUALITY` when given.
pub fn write_aia_file(path: &Path, quality: Option<i64>) {
    let mut bytes = Vec::new();
    bytes.extend(value_card("SIMPLE", "T"));
    bytes.extend(value_card("BITPIX", "8"));
    bytes.extend(value_card("NAXIS", "0"));
    bytes.extend(card("END"));
    pad(&mut bytes, b' ');

    bytes.extend(card("XTENSION= 'IMAGE   '"));
    bytes.extend(value_card("BITPIX", "16"));
    bytes.extend(value_card("NAXIS", "2"));
    bytes.extend(value_card("NAXIS1", "8"));
    bytes.extend(value_card("NAXIS2", "8"));
    bytes.extend(value_card("PCOUNT", "0"));
    bytes.extend(value_card("GCOUNT", "1"));
    bytes.extend(card("INSTRUME= 'AIA_3   '"));
    if let Some(q) = quality {
        bytes.extend(value_card("QUALITY", &q.to_string()));
    }
    bytes.extend(card("END"));
    pad(&mut bytes, b' ');
    bytes.extend(vec![0u8; 8 * 8 * 2]);
    pad(&mut bytes, 0);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

/// Writes an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
    path.to_path_buf()
}

/// Substitutes `@ROOT@` in a YAML template.
pub fn render(template: &str, root: &Path) -> String {
    template.replace("@ROOT@", &root.display().to_string())
}
