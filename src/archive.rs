//! Zip archive extraction and payload discovery

use crate::model::names_match;
use crate::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Extract every entry of the zip at `archive` under `dest`.
///
/// Entries whose path would escape `dest` are skipped. Returns the number of
/// files written.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<u64> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;

        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                tracing::warn!("Skipping unsafe archive entry '{}'", entry.name());
                continue;
            }
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    Ok(written)
}

/// The directory inside an extracted archive that maps onto the install folder.
///
/// Archives are commonly packed with a single top-level folder named after the
/// package. When the extraction root holds exactly one directory, no loose
/// files, and that directory matches one of `expected_names` (ignoring case),
/// that directory is the payload. Otherwise the extraction root is.
pub fn bundle_root(extract_dir: &Path, expected_names: &[&str]) -> Result<PathBuf> {
    let mut dirs = Vec::new();
    let mut has_files = false;

    for entry in fs::read_dir(extract_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        } else {
            has_files = true;
        }
    }

    if !has_files && dirs.len() == 1 {
        let only = &dirs[0];
        let matches = only
            .file_name()
            .map(|n| {
                let n = n.to_string_lossy();
                expected_names.iter().any(|e| names_match(&n, e))
            })
            .unwrap_or(false);
        if matches {
            return Ok(only.clone());
        }
    }

    if dirs.is_empty() && !has_files {
        return Err(Error::Other(format!(
            "Archive extracted to {} is empty",
            extract_dir.display()
        )));
    }

    Ok(extract_dir.to_path_buf())
}

/// First file with `extension` (case-insensitive) under `dir`, in name order.
pub fn find_artifact(dir: &Path, extension: &str) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
}

/// Build an in-memory zip from `(path, contents)` pairs; paths ending in `/`
/// become directory entries.
#[cfg(test)]
pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
