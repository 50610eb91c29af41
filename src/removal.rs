//! Removal of packages the server no longer lists

use crate::fsutil::remove_path;
use crate::model::{EntryStatus, PackagingKind, ReconciliationEntry};
use crate::progress::{Progress, ProgressSink, SyncStage};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Packages removed and packages that could not be.
#[derive(Debug, Default)]
pub struct RemovalReport {
    pub removed: Vec<String>,
    pub failures: Vec<(String, Error)>,
}

impl RemovalReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct OrphanRemover {
    install_root: PathBuf,
    artifact_extension: String,
    progress: Progress,
}

impl OrphanRemover {
    pub fn new(install_root: impl Into<PathBuf>, artifact_extension: impl Into<String>) -> Self {
        Self {
            install_root: install_root.into(),
            artifact_extension: artifact_extension.into(),
            progress: Progress::default(),
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Progress::new(Some(sink));
        self
    }

    /// Delete every orphaned entry's files; other entries are ignored.
    ///
    /// A package whose files are already gone counts as removed.
    pub fn remove(&self, entries: &[ReconciliationEntry]) -> RemovalReport {
        let mut report = RemovalReport::default();

        for entry in entries.iter().filter(|e| e.status == EntryStatus::Orphaned) {
            self.progress.emit(&entry.name, SyncStage::Removing, None);

            match self.remove_one(entry) {
                Ok(()) => {
                    tracing::info!("Removed {}", entry.name);
                    self.progress.emit(&entry.name, SyncStage::Removed, None);
                    report.removed.push(entry.name.clone());
                }
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", entry.name, e);
                    self.progress.emit(&entry.name, SyncStage::Failed, None);
                    report.failures.push((entry.name.clone(), e));
                }
            }
        }

        report
    }

    fn remove_one(&self, entry: &ReconciliationEntry) -> Result<()> {
        let target = self.target_for(entry);

        if !is_within(&self.install_root, &target) {
            return Err(Error::Other(format!(
                "Refusing to remove {} outside {}",
                target.display(),
                self.install_root.display()
            )));
        }

        remove_path(&target)?;
        Ok(())
    }

    fn target_for(&self, entry: &ReconciliationEntry) -> PathBuf {
        if let Some(ref path) = entry.local_path {
            return path.clone();
        }
        match entry.kind {
            PackagingKind::DirectoryBundle => self.install_root.join(entry.install_folder()),
            PackagingKind::SingleFile => self
                .install_root
                .join(format!("{}.{}", entry.name, self.artifact_extension)),
        }
    }
}

fn is_within(root: &Path, target: &Path) -> bool {
    target != root
        && target.starts_with(root)
        && !target
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
}
