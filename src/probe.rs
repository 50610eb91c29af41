//! Reading package versions from disk
//!
//! Older deployments carry no metadata beside the binaries, so the version is
//! taken from the `FileVersion` string of the artifact's Windows version
//! resource. Newer deployments drop a small JSON descriptor into the package
//! folder, which wins when present.

use crate::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Version reported for an artifact that is readable but carries no version.
pub const UNKNOWN_VERSION: &str = "0";

/// Reads a version string out of a binary artifact.
pub trait VersionProbe {
    /// `Ok(None)` means the artifact was readable but had no version metadata.
    /// An `Err` means the artifact itself could not be read.
    fn artifact_version(&self, artifact: &Path) -> Result<Option<String>>;
}

/// Extracts `FileVersion` from the `StringFileInfo` table of a PE version resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedVersionProbe;

const FILE_VERSION_KEY: &str = "FileVersion";
const MAX_VERSION_CHARS: usize = 64;

impl VersionProbe for EmbeddedVersionProbe {
    fn artifact_version(&self, artifact: &Path) -> Result<Option<String>> {
        let bytes = fs::read(artifact)?;
        Ok(find_file_version(&bytes))
    }
}

/// Scan raw bytes for the UTF-16LE `FileVersion\0` key and decode the value after it.
pub(crate) fn find_file_version(bytes: &[u8]) -> Option<String> {
    let key: Vec<u8> = FILE_VERSION_KEY
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|unit| unit.to_le_bytes())
        .collect();

    let mut search_from = 0;
    while let Some(found) = find_subslice(&bytes[search_from..], &key) {
        let key_start = search_from + found;
        // value is aligned to a 32-bit boundary after the key
        let value_start = (key_start + key.len() + 3) & !3;
        if let Some(value) = read_utf16_value(bytes, value_start) {
            return Some(value);
        }
        search_from = key_start + key.len();
    }

    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn read_utf16_value(bytes: &[u8], start: usize) -> Option<String> {
    let units: Vec<u16> = bytes
        .get(start..)?
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|unit| *unit != 0)
        .take(MAX_VERSION_CHARS)
        .collect();

    let value = String::from_utf16(&units).ok()?;
    let value = value.trim().to_string();

    if value.chars().any(|c| c.is_ascii_digit()) {
        Some(value)
    } else {
        None
    }
}

/// Descriptor file dropped into a package folder by newer deployments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sidecar {
    #[serde(default, alias = "Name")]
    pub name: Option<String>,
    #[serde(alias = "Version")]
    pub version: String,
}

/// Load the sidecar descriptor from `dir`, if there is one.
///
/// A missing file is `Ok(None)`; an unreadable or malformed one is an error.
pub fn read_sidecar(dir: &Path, file_name: &str) -> Result<Option<Sidecar>> {
    let path = dir.join(file_name);
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)?;
    let sidecar: Sidecar = serde_json::from_str(&content)?;
    Ok(Some(sidecar))
}

/// Build bytes that look like a `String` entry of a version resource.
#[cfg(test)]
pub(crate) fn fake_version_resource(version: &str) -> Vec<u8> {
    let mut bytes = b"MZ\x90\x00junk".to_vec(); // 8 bytes, keeps the header 4-aligned
    bytes.extend_from_slice(&[0x40, 0x00, 0x08, 0x00, 0x01, 0x00]);
    for unit in FILE_VERSION_KEY.encode_utf16().chain(std::iter::once(0)) {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    for unit in version.encode_utf16().chain(std::iter::once(0)) {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes.extend_from_slice(b"\x00\x00trailing");
    bytes
}
