//! Platform version gate and platform update
//!
//! The platform is the modding runtime the packages are built against. Its
//! installed version is the embedded version of one core binary and is
//! compared numerically with the version the platform server reports. A newer
//! server version takes priority over any package work: the platform has to
//! be updated first.
//!
//! An update replaces files in the game root from one zip. Every file about to
//! be overwritten is copied to a backup first; if writing any file fails, the
//! backups are put back and files the update created are removed.

use crate::config::Config;
use crate::fsutil::remove_path;
use crate::model::names_match;
use crate::probe::VersionProbe;
use crate::progress::{PercentTracker, Progress, ProgressSink, SyncStage};
use crate::server::ServerClient;
use crate::version::DottedVersion;
use crate::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Version of the platform installed under the game root, if it can be read.
pub fn installed_version<P: VersionProbe>(binary: &Path, probe: &P) -> Option<DottedVersion> {
    match probe.artifact_version(binary) {
        Ok(Some(raw)) => match raw.parse() {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!("Platform binary {} has unusable version: {}", binary.display(), e);
                None
            }
        },
        Ok(None) => {
            tracing::warn!("Platform binary {} carries no version", binary.display());
            None
        }
        Err(e) => {
            tracing::debug!("Cannot read platform binary {}: {}", binary.display(), e);
            None
        }
    }
}

/// Version the platform server offers; `None` when unreachable or malformed.
///
/// The endpoint answers with a JSON string; bare text is accepted too.
pub fn server_version(client: &ServerClient, platform_name: &str) -> Option<DottedVersion> {
    let url = client.endpoint(&[platform_name, "version"]);
    let body = match client.get_text(&url) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Failed to fetch platform version from {}: {}", url, e);
            return None;
        }
    };

    let raw = serde_json::from_str::<String>(&body).unwrap_or(body);
    match raw.parse() {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::warn!("Platform server sent an unusable version: {}", e);
            None
        }
    }
}

/// Outcome of comparing the installed platform with the server's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformGate {
    /// Installed version is at least the server's
    Current,
    /// The server has a strictly newer platform
    UpdateAvailable {
        installed: DottedVersion,
        available: DottedVersion,
    },
    /// One of the two versions could not be determined
    Unknown,
}

impl PlatformGate {
    pub fn evaluate(installed: Option<DottedVersion>, available: Option<DottedVersion>) -> Self {
        match (installed, available) {
            (Some(installed), Some(available)) if available > installed => {
                PlatformGate::UpdateAvailable {
                    installed,
                    available,
                }
            }
            (Some(_), Some(_)) => PlatformGate::Current,
            _ => PlatformGate::Unknown,
        }
    }

    pub fn requires_update(&self) -> bool {
        matches!(self, PlatformGate::UpdateAvailable { .. })
    }
}

/// Files touched by a platform update.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlatformUpdateReport {
    pub written: usize,
    pub backed_up: usize,
    pub skipped: usize,
}

pub struct PlatformUpdater<'a> {
    client: &'a ServerClient,
    game_root: PathBuf,
    platform_name: String,
    skip: Vec<String>,
    progress: Progress,
}

impl<'a> PlatformUpdater<'a> {
    pub fn new(
        client: &'a ServerClient,
        game_root: impl Into<PathBuf>,
        platform_name: impl Into<String>,
        skip: Vec<String>,
    ) -> Self {
        Self {
            client,
            game_root: game_root.into(),
            platform_name: platform_name.into(),
            skip,
            progress: Progress::default(),
        }
    }

    pub fn from_config(client: &'a ServerClient, config: &Config) -> Result<Self> {
        Ok(Self::new(
            client,
            config.game_root()?,
            config.platform_name.clone(),
            config.platform_update_skip.clone(),
        ))
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Progress::new(Some(sink));
        self
    }

    /// `{game_root}/{platform}_temp`, holding the download and the backup
    pub fn work_dir(&self) -> PathBuf {
        self.game_root.join(format!("{}_temp", self.platform_name))
    }

    /// Download the update package and apply it over the game root.
    pub fn run(&self) -> Result<PlatformUpdateReport> {
        let label = self.platform_name.as_str();
        let work = self.work_dir();
        fs::create_dir_all(&work)?;

        let archive = work.join(format!("{}_update.zip", self.platform_name));
        let backup = work.join("backup");
        let url = self.client.endpoint(&[label, "update"]);

        self.progress.emit(label, SyncStage::Downloading, None);
        let mut tracker = PercentTracker::new();
        let downloaded = self.client.download_to(&url, &archive, |done, total| {
            if let Some(percent) = tracker.update(done, total) {
                self.progress.emit(label, SyncStage::Downloading, Some(percent));
            }
        });

        let result = downloaded.and_then(|_| {
            self.progress.emit(label, SyncStage::Installing, None);
            self.apply(&archive, &backup)
        });

        let _ = remove_path(&archive);
        match result {
            Ok(report) => {
                let _ = remove_path(&backup);
                // only removes the work dir when nothing else was left in it
                let _ = fs::remove_dir(&work);
                tracing::info!(
                    "Platform updated: {} file(s) written, {} skipped",
                    report.written,
                    report.skipped
                );
                self.progress.emit(label, SyncStage::UpToDate, None);
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Platform update failed: {}", e);
                self.progress.emit(label, SyncStage::Failed, None);
                Err(e)
            }
        }
    }

    fn is_skipped(&self, relative: &Path) -> bool {
        relative
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                self.skip.iter().any(|s| names_match(s, &name))
            })
            .unwrap_or(false)
    }

    fn apply(&self, archive: &Path, backup_dir: &Path) -> Result<PlatformUpdateReport> {
        let mut zip = ZipArchive::new(File::open(archive)?)?;
        let mut report = PlatformUpdateReport::default();

        let mut targets = Vec::new();
        for i in 0..zip.len() {
            let entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let relative = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    tracing::warn!("Skipping unsafe archive entry '{}'", entry.name());
                    continue;
                }
            };
            if self.is_skipped(&relative) {
                report.skipped += 1;
                continue;
            }
            targets.push((i, relative));
        }

        let mut backed_up = Vec::new();
        for (_, relative) in &targets {
            let dest = self.game_root.join(relative);
            if dest.is_file() {
                let saved = backup_dir.join(relative);
                if let Some(parent) = saved.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&dest, &saved)?;
                backed_up.push(relative.clone());
            }
        }
        report.backed_up = backed_up.len();

        let mut created = Vec::new();
        for (index, relative) in &targets {
            let dest = self.game_root.join(relative);
            // recorded before writing so a half-written file is rolled back too
            if !backed_up.contains(relative) && !dest.exists() {
                created.push(relative.clone());
            }
            if let Err(e) = write_entry(&mut zip, *index, &dest) {
                self.roll_back(backup_dir, &backed_up, &created)?;
                return Err(e);
            }
            report.written += 1;
        }

        Ok(report)
    }

    fn roll_back(&self, backup_dir: &Path, backed_up: &[PathBuf], created: &[PathBuf]) -> Result<()> {
        tracing::warn!("Rolling back platform update");

        for relative in created {
            let _ = remove_path(&self.game_root.join(relative));
        }

        for relative in backed_up {
            let saved = backup_dir.join(relative);
            let dest = self.game_root.join(relative);
            fs::copy(&saved, &dest).map_err(|e| {
                Error::Other(format!(
                    "Could not restore {} ({}); backups are kept in {}",
                    dest.display(),
                    e,
                    backup_dir.display()
                ))
            })?;
        }

        let _ = remove_path(backup_dir);
        Ok(())
    }
}

fn write_entry<R: io::Read + io::Seek>(zip: &mut ZipArchive<R>, index: usize, dest: &Path) -> Result<()> {
    let mut entry = zip.by_index(index)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(dest)?;
    io::copy(&mut entry, &mut out)?;
    Ok(())
}
