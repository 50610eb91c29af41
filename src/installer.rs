//! Package download and installation
//!
//! [`SyncExecutor`] drives every pending reconciliation entry through
//! `Preparing → Downloading → Extracting → Installing` and reports each step
//! as a [`SyncEvent`](crate::progress::SyncEvent). Entries are independent:
//! one failing never stops the rest, and every failure is returned as a value
//! in the [`SyncReport`].
//!
//! Whatever is installed for a package is moved aside before the new payload
//! is placed and put back if placing fails, so a failed item leaves the
//! previous install as it was. The configuration subfolder of a directory
//! bundle is carried over from the previous install into the new one.
//!
//! # Examples
//!
//! ```no_run
//! use modsync::{reconcile, Config, InstallOptions, ManifestFetcher, ManifestSource};
//! use modsync::{InventoryScanner, ScanOptions, ServerClient, SyncExecutor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let client = ServerClient::from_config(&config)?;
//! let fetcher = ManifestFetcher::from_config(&client, &config);
//!
//! let local = InventoryScanner::new(ScanOptions::from_config(&config)).scan(&config.mods_path()?);
//! let plan = reconcile(&fetcher.fetch_manifest(), &local);
//!
//! let executor = SyncExecutor::new(&client, &fetcher, InstallOptions::from_config(&config)?);
//! let report = executor.run(plan.entries());
//! println!("{} installed, {} failed", report.installed().count(), report.failures().count());
//! # Ok(())
//! # }
//! ```

use crate::archive::{bundle_root, extract_zip, find_artifact};
use crate::config::Config;
use crate::fsutil::{copy_dir_recursive, find_child_ignore_case, move_path, remove_path, scratch_name};
use crate::manifest::ManifestSource;
use crate::model::{PackageDescriptor, PackagingKind, ReconciliationEntry};
use crate::progress::{PercentTracker, Progress, ProgressSink, SyncStage};
use crate::server::ServerClient;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Where packages go and where scratch files live.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub install_root: PathBuf,
    /// Downloads, extraction folders and backups are created here
    pub scratch_dir: PathBuf,
    pub artifact_extension: String,
    /// Subfolder of a bundle that holds user settings
    pub config_subfolder: String,
}

impl InstallOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            install_root: config.mods_path()?,
            scratch_dir: std::env::temp_dir().join("modsync"),
            artifact_extension: config.artifact_extension.clone(),
            config_subfolder: config.config_subfolder.clone(),
        })
    }
}

/// Why one package could not be synced, and at which step.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct ItemFailure {
    pub stage: SyncStage,
    #[source]
    pub error: Error,
}

fn at<E: Into<Error>>(stage: SyncStage) -> impl FnOnce(E) -> ItemFailure {
    move |error| ItemFailure {
        stage,
        error: error.into(),
    }
}

/// Result of syncing one package: the installed version, or the failure.
#[derive(Debug)]
pub struct ItemOutcome {
    pub package: String,
    pub result: std::result::Result<String, ItemFailure>,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of one sync run, in the order the entries were processed.
#[derive(Debug, Default)]
pub struct SyncReport {
    outcomes: Vec<ItemOutcome>,
}

impl SyncReport {
    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    pub fn installed(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(ItemOutcome::is_success)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The overall state the run leaves the packages in.
    pub fn state(&self) -> SyncStage {
        if self.is_success() {
            SyncStage::UpToDate
        } else {
            SyncStage::Failed
        }
    }
}

/// Temporary paths removed when the item finishes, however it finishes.
#[derive(Default)]
struct Scratch {
    paths: Vec<PathBuf>,
}

impl Scratch {
    fn track(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = remove_path(path) {
                tracing::warn!("Could not remove temporary {}: {}", path.display(), e);
            }
        }
    }
}

pub struct SyncExecutor<'a, M: ManifestSource> {
    client: &'a ServerClient,
    manifest: &'a M,
    options: InstallOptions,
    progress: Progress,
}

impl<'a, M: ManifestSource> SyncExecutor<'a, M> {
    pub fn new(client: &'a ServerClient, manifest: &'a M, options: InstallOptions) -> Self {
        Self {
            client,
            manifest,
            options,
            progress: Progress::default(),
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Progress::new(Some(sink));
        self
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Sync every entry that needs it; the others are ignored.
    pub fn run(&self, entries: &[ReconciliationEntry]) -> SyncReport {
        let mut report = SyncReport::default();

        for entry in entries.iter().filter(|e| e.status.needs_sync()) {
            let result = self.sync_entry(entry);

            match &result {
                Ok(version) => {
                    tracing::info!("Installed {} {}", entry.name, version);
                }
                Err(failure) => {
                    tracing::warn!("Failed to sync {}: {}", entry.name, failure);
                    self.progress.emit(&entry.name, SyncStage::Failed, None);
                }
            }

            report.outcomes.push(ItemOutcome {
                package: entry.name.clone(),
                result,
            });
        }

        report
    }

    /// Download and install one package, returning the installed version.
    pub fn sync_entry(&self, entry: &ReconciliationEntry) -> std::result::Result<String, ItemFailure> {
        let name = entry.name.as_str();
        let mut scratch = Scratch::default();

        self.progress.emit(name, SyncStage::Preparing, None);
        let descriptor = self.descriptor_for(entry).map_err(at(SyncStage::Preparing))?;
        let url = self
            .client
            .archive_url(&descriptor)
            .map_err(at(SyncStage::Preparing))?;
        fs::create_dir_all(&self.options.scratch_dir).map_err(at(SyncStage::Preparing))?;

        self.progress.emit(name, SyncStage::Downloading, None);
        let archive = self.options.scratch_dir.join(scratch_name(name, Some("zip")));
        scratch.track(&archive);
        let mut tracker = PercentTracker::new();
        self.client
            .download_to(&url, &archive, |done, total| {
                if let Some(percent) = tracker.update(done, total) {
                    self.progress.emit(name, SyncStage::Downloading, Some(percent));
                }
            })
            .map_err(at(SyncStage::Downloading))?;

        self.progress.emit(name, SyncStage::Extracting, None);
        let extract_dir = self
            .options
            .scratch_dir
            .join(scratch_name(&format!("{}_extract", name), None));
        scratch.track(&extract_dir);
        extract_zip(&archive, &extract_dir).map_err(at(SyncStage::Extracting))?;

        self.progress.emit(name, SyncStage::Installing, None);
        match descriptor.kind {
            PackagingKind::DirectoryBundle => self.install_bundle(entry, &extract_dir),
            PackagingKind::SingleFile => self.install_single_file(entry, &extract_dir),
        }
        .map_err(at(SyncStage::Installing))?;

        self.progress.emit(name, SyncStage::UpToDate, None);
        Ok(descriptor.version)
    }

    fn descriptor_for(&self, entry: &ReconciliationEntry) -> Result<PackageDescriptor> {
        if let Some(ref archive) = entry.archive {
            return Ok(PackageDescriptor::new(&entry.name, &entry.remote_version, entry.kind)
                .with_archive(archive.clone()));
        }

        // the entry was built without a locator; ask the server again
        self.manifest
            .find_package(&entry.name)
            .ok_or_else(|| Error::PackageNotFound(entry.name.clone()))
    }

    fn install_bundle(&self, entry: &ReconciliationEntry, extract_dir: &Path) -> Result<()> {
        let folder = entry.install_folder();
        let payload = bundle_root(extract_dir, &[entry.name.as_str(), folder])?;
        let dest = self.options.install_root.join(folder);

        self.replace_installed(entry, &dest, |backup| {
            copy_dir_recursive(&payload, &dest)?;
            if let Some(previous) = backup {
                self.carry_over_config(previous, &dest)?;
            }
            Ok(())
        })
    }

    fn install_single_file(&self, entry: &ReconciliationEntry, extract_dir: &Path) -> Result<()> {
        let artifact = find_artifact(extract_dir, &self.options.artifact_extension)
            .ok_or_else(|| Error::NoPayload(entry.name.clone()))?;
        let file_name = artifact
            .file_name()
            .ok_or_else(|| Error::NoPayload(entry.name.clone()))?;
        let dest = self.options.install_root.join(file_name);

        self.replace_installed(entry, &dest, |_| {
            fs::copy(&artifact, &dest)?;
            Ok(())
        })
    }

    /// Move the current install aside, run `place`, and either drop the
    /// backup or put it back.
    ///
    /// `place` receives the backup location when there was a previous install.
    fn replace_installed<F>(&self, entry: &ReconciliationEntry, dest: &Path, place: F) -> Result<()>
    where
        F: FnOnce(Option<&Path>) -> Result<()>,
    {
        fs::create_dir_all(&self.options.install_root)?;

        let existing = entry
            .local_path
            .clone()
            .filter(|p| p.exists())
            .or_else(|| Some(dest.to_path_buf()).filter(|p| p.exists()));

        let backup = match existing {
            Some(original) => {
                let backup = self
                    .options
                    .scratch_dir
                    .join(scratch_name(&format!("{}_backup", entry.name), None));
                move_path(&original, &backup).map_err(|e| {
                    Error::Other(format!(
                        "Failed to back up existing '{}' at {}: {}",
                        entry.name,
                        original.display(),
                        e
                    ))
                })?;
                Some((original, backup))
            }
            None => None,
        };

        let placed = remove_path(dest).and_then(|_| place(backup.as_ref().map(|(_, b)| b.as_path())));

        match (placed, backup) {
            (Ok(()), Some((_, backup))) => {
                if let Err(e) = remove_path(&backup) {
                    tracing::warn!("Could not remove backup {}: {}", backup.display(), e);
                }
                Ok(())
            }
            (Ok(()), None) => Ok(()),
            (Err(e), backup) => {
                let _ = remove_path(dest);
                if let Some((original, backup)) = backup {
                    if let Err(restore_err) = move_path(&backup, &original) {
                        return Err(Error::Other(format!(
                            "{}; restoring the previous install also failed ({}), it is kept at {}",
                            e,
                            restore_err,
                            backup.display()
                        )));
                    }
                }
                Err(e)
            }
        }
    }

    /// Copy the previous install's config subfolder over the fresh one.
    fn carry_over_config(&self, previous: &Path, dest: &Path) -> Result<()> {
        if !previous.is_dir() {
            return Ok(());
        }

        let saved = match find_child_ignore_case(previous, &self.options.config_subfolder) {
            Some(dir) if dir.is_dir() => dir,
            _ => return Ok(()),
        };
        let folder_name = saved
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| self.options.config_subfolder.clone().into());

        // user settings win over whatever the payload ships
        if let Some(shipped) = find_child_ignore_case(dest, &self.options.config_subfolder) {
            remove_path(&shipped)?;
        }
        copy_dir_recursive(&saved, &dest.join(folder_name))?;
        tracing::debug!("Kept settings from {}", saved.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::build_zip;
    use crate::model::{ArchiveLocator, EntryStatus, ABSENT_VERSION};
    use crate::progress::{channel, SyncEvent};
    use std::time::Duration;
    use tempfile::TempDir;

    struct StaticManifest(Vec<PackageDescriptor>);

    impl ManifestSource for StaticManifest {
        fn fetch_manifest(&self) -> Vec<PackageDescriptor> {
            self.0.clone()
        }
    }

    struct Fixture {
        _temp: TempDir,
        server: mockito::ServerGuard,
        client: ServerClient,
        options: InstallOptions,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let server = mockito::Server::new();
            let client =
                ServerClient::new(server.url(), Duration::from_secs(5), Duration::from_secs(5)).unwrap();
            let options = InstallOptions {
                install_root: temp.path().join("plugins"),
                scratch_dir: temp.path().join("scratch"),
                artifact_extension: "dll".to_string(),
                config_subfolder: "config".to_string(),
            };
            Self {
                _temp: temp,
                server,
                client,
                options,
            }
        }

        fn serve(&mut self, name: &str, status: usize, body: Vec<u8>) -> mockito::Mock {
            self.server
                .mock("GET", format!("/mods/{}", name).as_str())
                .with_status(status)
                .with_body(body)
                .create()
        }

        fn root(&self) -> &Path {
            &self.options.install_root
        }

        fn scratch_is_clean(&self) -> bool {
            fs::read_dir(&self.options.scratch_dir)
                .map(|mut d| d.next().is_none())
                .unwrap_or(true)
        }
    }

    fn entry(name: &str, kind: PackagingKind, local_path: Option<PathBuf>) -> ReconciliationEntry {
        ReconciliationEntry {
            name: name.to_string(),
            local_version: if local_path.is_some() { "1.0".to_string() } else { ABSENT_VERSION.to_string() },
            remote_version: "2.0".to_string(),
            status: if local_path.is_some() { EntryStatus::NeedsUpdate } else { EntryStatus::NotInstalled },
            kind,
            archive: Some(ArchiveLocator::FileName(format!("{}.zip", name))),
            install_folder_name: None,
            local_path,
        }
    }

    // ============================================================================
    // Directory bundles
    // ============================================================================

    #[test]
    fn test_install_new_bundle() {
        let mut fx = Fixture::new();
        let _m = fx.serve(
            "Radar",
            200,
            build_zip(&[("Radar/Radar.dll", b"v2"), ("Radar/assets/icon.png", b"png")]),
        );

        let (sink, rx) = channel();
        let manifest = StaticManifest(vec![]);
        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone()).with_progress(sink);
        let report = executor.run(&[entry("Radar", PackagingKind::DirectoryBundle, None)]);

        assert!(report.is_success());
        assert_eq!(report.state(), SyncStage::UpToDate);
        assert_eq!(report.outcomes()[0].result.as_ref().unwrap(), "2.0");
        assert_eq!(fs::read(fx.root().join("Radar/Radar.dll")).unwrap(), b"v2");
        assert!(fx.root().join("Radar/assets/icon.png").exists());
        assert!(fx.scratch_is_clean());

        let stages: Vec<SyncStage> = rx.try_iter().map(|e: SyncEvent| e.stage).collect();
        assert_eq!(stages.first(), Some(&SyncStage::Preparing));
        assert_eq!(stages.last(), Some(&SyncStage::UpToDate));
        assert!(stages.contains(&SyncStage::Extracting));
        assert!(stages.contains(&SyncStage::Installing));
    }

    #[test]
    fn test_update_bundle_preserves_config() {
        let mut fx = Fixture::new();
        let old = fx.root().join("Radar");
        fs::create_dir_all(old.join("config/nested")).unwrap();
        fs::write(old.join("Radar.dll"), b"v1").unwrap();
        fs::write(old.join("stale.dll"), b"old").unwrap();
        fs::write(old.join("config/settings.json"), b"{\"user\":true}").unwrap();
        fs::write(old.join("config/nested/keys.bin"), [0u8, 159, 146, 150]).unwrap();

        let _m = fx.serve(
            "Radar",
            200,
            build_zip(&[
                ("Radar/Radar.dll", b"v2"),
                ("Radar/config/settings.json", b"{\"user\":false}"),
            ]),
        );

        let manifest = StaticManifest(vec![]);
        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone());
        let report = executor.run(&[entry("Radar", PackagingKind::DirectoryBundle, Some(old.clone()))]);

        assert!(report.is_success(), "{:?}", report);
        assert_eq!(fs::read(old.join("Radar.dll")).unwrap(), b"v2");
        assert!(!old.join("stale.dll").exists());
        assert_eq!(
            fs::read(old.join("config/settings.json")).unwrap(),
            b"{\"user\":true}"
        );
        assert_eq!(
            fs::read(old.join("config/nested/keys.bin")).unwrap(),
            vec![0u8, 159, 146, 150]
        );
        assert!(fx.scratch_is_clean());
    }

    #[test]
    fn test_bundle_moves_to_new_folder_name() {
        let mut fx = Fixture::new();
        let old = fx.root().join("radar-manual");
        fs::create_dir_all(old.join("Config")).unwrap();
        fs::write(old.join("Radar.dll"), b"v1").unwrap();
        fs::write(old.join("Config/a.cfg"), b"mine").unwrap();

        let _m = fx.serve("Radar", 200, build_zip(&[("Radar.dll", b"v2")]));

        let manifest = StaticManifest(vec![]);
        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone());
        let mut e = entry("Radar", PackagingKind::DirectoryBundle, Some(old.clone()));
        e.install_folder_name = None;
        assert!(executor.run(&[e]).is_success());

        assert!(!old.exists());
        assert_eq!(fs::read(fx.root().join("Radar/Radar.dll")).unwrap(), b"v2");
        assert_eq!(fs::read(fx.root().join("Radar/Config/a.cfg")).unwrap(), b"mine");
    }

    // ============================================================================
    // Single files
    // ============================================================================

    #[test]
    fn test_install_single_file_replaces_previous() {
        let mut fx = Fixture::new();
        fs::create_dir_all(fx.root()).unwrap();
        let old = fx.root().join("Tweak.dll");
        fs::write(&old, b"v1").unwrap();

        let _m = fx.serve(
            "Tweak",
            200,
            build_zip(&[("readme.txt", b"hi"), ("bin/Tweak.dll", b"v2")]),
        );

        let manifest = StaticManifest(vec![]);
        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone());
        let report = executor.run(&[entry("Tweak", PackagingKind::SingleFile, Some(old.clone()))]);

        assert!(report.is_success());
        assert_eq!(fs::read(&old).unwrap(), b"v2");
        assert!(!fx.root().join("readme.txt").exists());
    }

    #[test]
    fn test_single_file_without_artifact_keeps_old_install() {
        let mut fx = Fixture::new();
        fs::create_dir_all(fx.root()).unwrap();
        let old = fx.root().join("Tweak.dll");
        fs::write(&old, b"v1").unwrap();

        let _m = fx.serve("Tweak", 200, build_zip(&[("readme.txt", b"nothing here")]));

        let manifest = StaticManifest(vec![]);
        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone());
        let report = executor.run(&[entry("Tweak", PackagingKind::SingleFile, Some(old.clone()))]);

        let failure = report.outcomes()[0].result.as_ref().unwrap_err();
        assert_eq!(failure.stage, SyncStage::Installing);
        assert!(matches!(failure.error, Error::NoPayload(_)));
        assert_eq!(fs::read(&old).unwrap(), b"v1");
        assert!(fx.scratch_is_clean());
    }

    // ============================================================================
    // Failure isolation
    // ============================================================================

    #[test]
    fn test_http_error_fails_only_that_item() {
        let mut fx = Fixture::new();
        let old = fx.root().join("Broken");
        fs::create_dir_all(&old).unwrap();
        fs::write(old.join("Broken.dll"), b"v1").unwrap();

        let _bad = fx.serve("Broken", 500, b"oops".to_vec());
        let _good = fx.serve("Fine", 200, build_zip(&[("Fine/Fine.dll", b"ok")]));

        let (sink, rx) = channel();
        let manifest = StaticManifest(vec![]);
        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone()).with_progress(sink);
        let report = executor.run(&[
            entry("Broken", PackagingKind::DirectoryBundle, Some(old.clone())),
            entry("Fine", PackagingKind::DirectoryBundle, None),
        ]);

        assert!(!report.is_success());
        assert_eq!(report.state(), SyncStage::Failed);
        assert_eq!(report.installed().count(), 1);

        let failure = report.outcomes()[0].result.as_ref().unwrap_err();
        assert_eq!(failure.stage, SyncStage::Downloading);
        assert!(matches!(failure.error, Error::HttpStatus { status: 500, .. }));

        assert_eq!(fs::read(old.join("Broken.dll")).unwrap(), b"v1");
        assert!(fx.root().join("Fine/Fine.dll").exists());

        let events: Vec<SyncEvent> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| e.package == "Broken" && e.stage == SyncStage::Failed));
        assert!(events
            .iter()
            .any(|e| e.package == "Fine" && e.stage == SyncStage::UpToDate));
    }

    #[test]
    fn test_corrupt_archive_fails_at_extract() {
        let mut fx = Fixture::new();
        let _m = fx.serve("Junk", 200, b"not a zip at all".to_vec());

        let manifest = StaticManifest(vec![]);
        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone());
        let report = executor.run(&[entry("Junk", PackagingKind::DirectoryBundle, None)]);

        let failure = report.outcomes()[0].result.as_ref().unwrap_err();
        assert_eq!(failure.stage, SyncStage::Extracting);
        assert!(!fx.root().join("Junk").exists());
        assert!(fx.scratch_is_clean());
    }

    #[test]
    fn test_up_to_date_entries_are_skipped() {
        let fx = Fixture::new();
        let manifest = StaticManifest(vec![]);
        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone());

        let mut done = entry("Done", PackagingKind::SingleFile, Some(PathBuf::from("x")));
        done.status = EntryStatus::UpToDate;
        let mut orphan = entry("Gone", PackagingKind::SingleFile, Some(PathBuf::from("y")));
        orphan.status = EntryStatus::Orphaned;

        assert!(executor.run(&[done, orphan]).is_empty());
    }

    // ============================================================================
    // Descriptor lookup
    // ============================================================================

    #[test]
    fn test_missing_locator_refetches_manifest() {
        let mut fx = Fixture::new();
        let _m = fx
            .server
            .mock("GET", "/files/radar-3.zip")
            .with_status(200)
            .with_body(build_zip(&[("Radar/Radar.dll", b"v3")]))
            .create();

        let manifest = StaticManifest(vec![PackageDescriptor::new(
            "radar",
            "3.0",
            PackagingKind::DirectoryBundle,
        )
        .with_archive(ArchiveLocator::Url("files/radar-3.zip".to_string()))]);

        let mut e = entry("Radar", PackagingKind::DirectoryBundle, None);
        e.archive = None;

        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone());
        let report = executor.run(&[e]);
        assert_eq!(report.outcomes()[0].result.as_ref().unwrap(), "3.0");
        assert_eq!(fs::read(fx.root().join("Radar/Radar.dll")).unwrap(), b"v3");
    }

    #[test]
    fn test_missing_locator_and_absent_from_manifest() {
        let fx = Fixture::new();
        let manifest = StaticManifest(vec![]);
        let mut e = entry("Ghost", PackagingKind::DirectoryBundle, None);
        e.archive = None;

        let executor = SyncExecutor::new(&fx.client, &manifest, fx.options.clone());
        let report = executor.run(&[e]);
        let failure = report.outcomes()[0].result.as_ref().unwrap_err();
        assert_eq!(failure.stage, SyncStage::Preparing);
        assert!(matches!(failure.error, Error::PackageNotFound(ref n) if n == "Ghost"));
    }
}
