//! Local inventory scanning
//!
//! Walks the package install directory and reports what is installed there.
//! Two layouts are recognized side by side:
//!
//! - **Directory bundles**: each immediate subfolder that holds at least one
//!   recognized artifact (searched recursively). Named after the folder, or
//!   after the sidecar descriptor when one is present.
//! - **Single files**: each recognized artifact lying directly in the install
//!   directory, named after the file stem.
//!
//! Scanning never fails as a whole. A missing install directory yields an
//! empty inventory and a package whose metadata cannot be read is skipped.

use crate::config::Config;
use crate::model::{name_key, names_match, LocalPackage, PackagingKind};
use crate::probe::{read_sidecar, EmbeddedVersionProbe, VersionProbe, UNKNOWN_VERSION};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What counts as a package and what is ignored.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub artifact_extension: String,
    pub sidecar_file_name: String,
    pub excluded_packages: Vec<String>,
    pub excluded_folders: Vec<String>,
}

impl ScanOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            artifact_extension: config.artifact_extension.clone(),
            sidecar_file_name: config.sidecar_file_name.clone(),
            excluded_packages: config.excluded_packages.clone(),
            excluded_folders: config.excluded_folders.clone(),
        }
    }

    /// True when `path` has the recognized artifact extension (case-insensitive).
    pub fn is_artifact(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.artifact_extension))
            .unwrap_or(false)
    }

    fn is_excluded_package(&self, name: &str) -> bool {
        contains_ignore_case(&self.excluded_packages, name)
    }

    fn is_excluded_folder(&self, name: &str) -> bool {
        contains_ignore_case(&self.excluded_folders, name)
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn contains_ignore_case(list: &[String], name: &str) -> bool {
    list.iter().any(|item| names_match(item, name))
}

/// Scans an install directory into [`LocalPackage`] records.
pub struct InventoryScanner<P: VersionProbe = EmbeddedVersionProbe> {
    options: ScanOptions,
    probe: P,
}

impl InventoryScanner<EmbeddedVersionProbe> {
    pub fn new(options: ScanOptions) -> Self {
        Self::with_probe(options, EmbeddedVersionProbe)
    }
}

impl<P: VersionProbe> InventoryScanner<P> {
    pub fn with_probe(options: ScanOptions, probe: P) -> Self {
        Self { options, probe }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Snapshot the packages installed under `root`.
    pub fn scan(&self, root: &Path) -> Vec<LocalPackage> {
        let mut packages = Vec::new();

        let entries = match sorted_entries(root) {
            Some(entries) => entries,
            None => {
                tracing::debug!("Install directory {} not present", root.display());
                return packages;
            }
        };

        let mut seen = HashSet::new();

        for dir in entries.iter().filter(|p| p.is_dir()) {
            if let Some(package) = self.scan_bundle(dir) {
                self.accept(package, &mut seen, &mut packages);
            }
        }

        for file in entries.iter().filter(|p| p.is_file()) {
            if let Some(package) = self.scan_single_file(file) {
                self.accept(package, &mut seen, &mut packages);
            }
        }

        tracing::debug!(
            "Found {} installed package(s) in {}",
            packages.len(),
            root.display()
        );
        packages
    }

    fn accept(
        &self,
        package: LocalPackage,
        seen: &mut HashSet<String>,
        packages: &mut Vec<LocalPackage>,
    ) {
        if package.name.trim().is_empty() || self.options.is_excluded_package(&package.name) {
            return;
        }
        // the first branch to claim a name keeps it
        if seen.insert(name_key(&package.name)) {
            packages.push(package);
        } else {
            tracing::debug!("Ignoring duplicate package '{}'", package.name);
        }
    }

    fn scan_bundle(&self, dir: &Path) -> Option<LocalPackage> {
        let folder = dir.file_name()?.to_string_lossy().to_string();
        if self.options.is_excluded_folder(&folder) {
            return None;
        }

        let first_artifact = self.first_artifact_in(dir)?;

        let (name, version) = match read_sidecar(dir, &self.options.sidecar_file_name) {
            Ok(Some(sidecar)) => {
                let name = sidecar
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .map(|n| n.trim().to_string())
                    .unwrap_or_else(|| folder.clone());
                (name, sidecar.version)
            }
            Ok(None) => (folder.clone(), self.probe_version(&first_artifact)?),
            Err(e) => {
                tracing::debug!("Skipping {}: unreadable descriptor: {}", dir.display(), e);
                return None;
            }
        };

        let install_folder_name = if name != folder { Some(folder) } else { None };

        Some(LocalPackage {
            name,
            version,
            kind: PackagingKind::DirectoryBundle,
            install_folder_name,
            path: dir.to_path_buf(),
        })
    }

    fn scan_single_file(&self, file: &Path) -> Option<LocalPackage> {
        if !self.options.is_artifact(file) {
            return None;
        }

        let name = file.file_stem()?.to_string_lossy().to_string();
        let version = self.probe_version(file)?;

        Some(LocalPackage {
            name,
            version,
            kind: PackagingKind::SingleFile,
            install_folder_name: None,
            path: file.to_path_buf(),
        })
    }

    fn first_artifact_in(&self, dir: &Path) -> Option<PathBuf> {
        WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .find(|p| self.options.is_artifact(p))
    }

    fn probe_version(&self, artifact: &Path) -> Option<String> {
        match self.probe.artifact_version(artifact) {
            Ok(Some(version)) => Some(version),
            Ok(None) => Some(UNKNOWN_VERSION.to_string()),
            Err(e) => {
                tracing::debug!("Skipping unreadable artifact {}: {}", artifact.display(), e);
                None
            }
        }
    }
}

fn sorted_entries(root: &Path) -> Option<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    Some(entries)
}
