//! Refresh and apply cycle
//!
//! A [`Session`] owns the configuration and the HTTP clients. [`Session::refresh`]
//! takes a [`Snapshot`]: the manifest, the local inventory, their
//! reconciliation and the platform gate. [`Session::apply`] acts on a snapshot:
//! config files first (a failure there stops everything), then package
//! installs, then orphan removal, then a rescan to confirm the result.

use crate::admin::AdminClient;
use crate::config::Config;
use crate::configsync::{ConfigSync, ConfigSyncReport};
use crate::installer::{InstallOptions, SyncExecutor, SyncReport};
use crate::inventory::{InventoryScanner, ScanOptions};
use crate::manifest::{ManifestFetcher, ManifestSource};
use crate::model::{LocalPackage, PackageDescriptor};
use crate::platform::{self, PlatformGate, PlatformUpdateReport, PlatformUpdater};
use crate::probe::EmbeddedVersionProbe;
use crate::progress::ProgressSink;
use crate::reconcile::{reconcile, Reconciliation};
use crate::removal::{OrphanRemover, RemovalReport};
use crate::server::ServerClient;
use crate::version::DottedVersion;
use crate::{Error, Result};
use std::path::PathBuf;
use std::process::{Child, Command};

/// What the user should be offered next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryAction {
    /// The platform must be updated before anything else
    UpdatePlatform {
        installed: DottedVersion,
        available: DottedVersion,
    },
    /// No manifest could be fetched
    Offline,
    /// Packages differ from the manifest
    Update,
    /// Everything matches; the client can be started
    Launch,
}

/// Server and disk state at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub remote: Vec<PackageDescriptor>,
    pub local: Vec<LocalPackage>,
    pub reconciliation: Reconciliation,
    pub platform: PlatformGate,
}

impl Snapshot {
    pub fn new(remote: Vec<PackageDescriptor>, local: Vec<LocalPackage>, platform: PlatformGate) -> Self {
        let reconciliation = reconcile(&remote, &local);
        Self {
            remote,
            local,
            reconciliation,
            platform,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.remote.is_empty()
    }

    pub fn primary_action(&self) -> PrimaryAction {
        if let PlatformGate::UpdateAvailable {
            installed,
            available,
        } = &self.platform
        {
            return PrimaryAction::UpdatePlatform {
                installed: installed.clone(),
                available: available.clone(),
            };
        }

        if self.is_offline() {
            PrimaryAction::Offline
        } else if self.reconciliation.is_fully_synced() {
            PrimaryAction::Launch
        } else {
            PrimaryAction::Update
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Leave packages the server no longer lists in place
    pub keep_orphans: bool,
}

/// Everything one apply did, plus the state it left behind.
#[derive(Debug)]
pub struct ApplyReport {
    pub config: ConfigSyncReport,
    pub sync: SyncReport,
    pub removal: RemovalReport,
    pub after: Snapshot,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.sync.is_success() && self.removal.is_success()
    }
}

pub struct Session {
    config: Config,
    client: ServerClient,
    platform_client: ServerClient,
    progress: Option<ProgressSink>,
}

impl Session {
    pub fn new(config: Config) -> Result<Self> {
        let client = ServerClient::from_config(&config)?;
        let platform_client = ServerClient::platform_from_config(&config)?;
        Ok(Self {
            config,
            client,
            platform_client,
            progress: None,
        })
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &ServerClient {
        &self.client
    }

    pub fn manifest(&self) -> ManifestFetcher<'_> {
        ManifestFetcher::from_config(&self.client, &self.config)
    }

    pub fn admin(&self) -> AdminClient<'_> {
        AdminClient::new(&self.client, self.config.secret.clone())
    }

    pub fn is_reachable(&self) -> bool {
        self.manifest().is_reachable()
    }

    pub fn scan_local(&self) -> Result<Vec<LocalPackage>> {
        let scanner = InventoryScanner::new(ScanOptions::from_config(&self.config));
        Ok(scanner.scan(&self.config.mods_path()?))
    }

    pub fn check_platform(&self) -> Result<PlatformGate> {
        let installed = platform::installed_version(&self.config.platform_binary()?, &EmbeddedVersionProbe);
        let available = platform::server_version(&self.platform_client, &self.config.platform_name);
        Ok(PlatformGate::evaluate(installed, available))
    }

    pub fn refresh(&self) -> Result<Snapshot> {
        let remote = self.manifest().fetch_manifest();
        let local = self.scan_local()?;
        let platform = self.check_platform()?;

        let snapshot = Snapshot::new(remote, local, platform);
        tracing::info!(
            "Refreshed: {} remote, {} local, {} pending",
            snapshot.remote.len(),
            snapshot.local.len(),
            snapshot.reconciliation.pending().len()
        );
        Ok(snapshot)
    }

    /// Bring the install in line with `snapshot`.
    ///
    /// Only a config file failure (or an offline snapshot) is an `Err`;
    /// per-package failures are in the report.
    pub fn apply(&self, snapshot: &Snapshot, options: ApplyOptions) -> Result<ApplyReport> {
        if snapshot.is_offline() {
            return Err(Error::Other(
                "Mod server is offline; nothing to apply".to_string(),
            ));
        }
        if let PlatformGate::UpdateAvailable { installed, available } = &snapshot.platform {
            return Err(Error::PlatformUpdateRequired {
                installed: installed.to_string(),
                available: available.to_string(),
            });
        }

        let config = ConfigSync::from_config(&self.client, &self.config)?.run()?;

        let fetcher = self.manifest();
        let mut executor = SyncExecutor::new(&self.client, &fetcher, InstallOptions::from_config(&self.config)?);
        if let Some(ref sink) = self.progress {
            executor = executor.with_progress(sink.clone());
        }
        let sync = executor.run(snapshot.reconciliation.entries());

        let removal = if options.keep_orphans {
            RemovalReport::default()
        } else {
            let mut remover = OrphanRemover::new(self.config.mods_path()?, self.config.artifact_extension.clone());
            if let Some(ref sink) = self.progress {
                remover = remover.with_progress(sink.clone());
            }
            remover.remove(snapshot.reconciliation.entries())
        };

        let after = Snapshot::new(snapshot.remote.clone(), self.scan_local()?, snapshot.platform.clone());
        if !after.reconciliation.is_fully_synced() {
            tracing::warn!(
                "{} package(s) still differ from the server after sync",
                after.reconciliation.entries().iter().filter(|e| e.status.needs_sync()).count()
            );
        }

        Ok(ApplyReport {
            config,
            sync,
            removal,
            after,
        })
    }

    pub fn update_platform(&self) -> Result<PlatformUpdateReport> {
        let mut updater = PlatformUpdater::from_config(&self.platform_client, &self.config)?;
        if let Some(ref sink) = self.progress {
            updater = updater.with_progress(sink.clone());
        }
        updater.run()
    }

    /// Start the game client from its own directory.
    pub fn launch_client(&self) -> Result<Child> {
        let executable = ensure_client_present(&self.config)?;
        let mut command = Command::new(&executable);
        if let Some(dir) = executable.parent() {
            command.current_dir(dir);
        }
        tracing::info!("Launching {}", executable.display());
        Ok(command.spawn()?)
    }
}

/// Path of the client executable, or [`Error::MissingExecutable`].
pub fn ensure_client_present(config: &Config) -> Result<PathBuf> {
    let executable = config.client_executable()?;
    if executable.is_file() {
        Ok(executable)
    } else {
        Err(Error::MissingExecutable(executable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PackagingKind;
    use std::fs;
    use tempfile::TempDir;

    fn v(s: &str) -> DottedVersion {
        s.parse().unwrap()
    }

    fn remote(name: &str, version: &str) -> PackageDescriptor {
        PackageDescriptor::new(name, version, PackagingKind::SingleFile)
    }

    fn local(name: &str, version: &str) -> LocalPackage {
        LocalPackage {
            name: name.to_string(),
            version: version.to_string(),
            kind: PackagingKind::SingleFile,
            install_folder_name: None,
            path: PathBuf::from(format!("{}.dll", name)),
        }
    }

    #[test]
    fn test_primary_action_order() {
        let synced = Snapshot::new(vec![remote("A", "1")], vec![local("A", "1")], PlatformGate::Current);
        assert_eq!(synced.primary_action(), PrimaryAction::Launch);

        let behind = Snapshot::new(vec![remote("A", "2")], vec![local("A", "1")], PlatformGate::Unknown);
        assert_eq!(behind.primary_action(), PrimaryAction::Update);

        let offline = Snapshot::new(vec![], vec![local("A", "1")], PlatformGate::Current);
        assert_eq!(offline.primary_action(), PrimaryAction::Offline);

        // the platform gate wins over everything else
        let gated = Snapshot::new(
            vec![],
            vec![],
            PlatformGate::UpdateAvailable {
                installed: v("1.0"),
                available: v("1.1"),
            },
        );
        assert_eq!(
            gated.primary_action(),
            PrimaryAction::UpdatePlatform {
                installed: v("1.0"),
                available: v("1.1")
            }
        );
    }

    #[test]
    fn test_orphan_only_is_update() {
        let snapshot = Snapshot::new(
            vec![remote("A", "1")],
            vec![local("A", "1"), local("Extra", "1")],
            PlatformGate::Current,
        );
        assert_eq!(snapshot.primary_action(), PrimaryAction::Update);
    }

    #[test]
    fn test_apply_refuses_offline_snapshot() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            game_root: Some(temp.path().to_path_buf()),
            ..Config::default()
        };
        fs::create_dir_all(config.mods_path().unwrap()).unwrap();
        fs::write(config.mods_path().unwrap().join("Keep.dll"), b"x").unwrap();

        let session = Session::new(config).unwrap();
        let offline = Snapshot::new(vec![], session.scan_local().unwrap(), PlatformGate::Unknown);
        assert!(session.apply(&offline, ApplyOptions::default()).is_err());
        assert!(session.config().mods_path().unwrap().join("Keep.dll").exists());
    }

    #[test]
    fn test_apply_refuses_outdated_platform() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            game_root: Some(temp.path().to_path_buf()),
            ..Config::default()
        };
        let session = Session::new(config).unwrap();
        let gated = Snapshot::new(
            vec![remote("A", "1")],
            vec![],
            PlatformGate::UpdateAvailable {
                installed: v("3.8.0"),
                available: v("3.9.0"),
            },
        );

        match session.apply(&gated, ApplyOptions::default()) {
            Err(Error::PlatformUpdateRequired { installed, available }) => {
                assert_eq!(installed, "3.8.0");
                assert_eq!(available, "3.9.0");
            }
            other => panic!("expected PlatformUpdateRequired, got {:?}", other.map(|_| ())),
        }
        assert!(!session.config().mods_path().unwrap().exists());
    }

    #[test]
    fn test_ensure_client_present() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            game_root: Some(temp.path().to_path_buf()),
            ..Config::default()
        };
        assert!(matches!(
            ensure_client_present(&config),
            Err(Error::MissingExecutable(_))
        ));

        let exe = config.client_executable().unwrap();
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, b"").unwrap();
        assert_eq!(ensure_client_present(&config).unwrap(), exe);
    }
}
