//! modsync - keeps a game client's mods in step with a server
//!
//! The server publishes a manifest of packages (name, version, archive,
//! packaging kind). modsync scans what is installed locally, reconciles the
//! two, and then downloads, installs or removes packages until the client
//! matches the server. Alongside the packages it keeps loose configuration
//! files in sync and gates everything behind a platform version check.
//!
//! - Package versions are compared as exact strings; platform versions are
//!   compared numerically.
//! - Fetch failures never propagate: an unreachable or broken server looks
//!   like an empty manifest, i.e. "offline".
//! - Package installs fail one at a time. A failed package keeps its previous
//!   install and does not stop the others.
//!
//! # Examples
//!
//! ```no_run
//! use modsync::{ApplyOptions, Config, PrimaryAction, Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(Config::load()?)?;
//! let snapshot = session.refresh()?;
//!
//! match snapshot.primary_action() {
//!     PrimaryAction::Update => {
//!         let report = session.apply(&snapshot, ApplyOptions::default())?;
//!         println!("{} package(s) installed", report.sync.installed().count());
//!     }
//!     other => println!("{:?}", other),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`inventory`] - Scan installed packages
//! - [`manifest`] - Fetch the server manifest
//! - [`reconcile`] - Classify remote against local
//! - [`installer`] - Download and install packages
//! - [`removal`] - Remove packages the server dropped
//! - [`configsync`] - Sync loose configuration files
//! - [`platform`] - Platform version gate and update
//! - [`session`] - Refresh/apply orchestration

pub mod admin;
pub mod archive;
pub mod config;
pub mod configsync;
pub mod error;
pub mod fsutil;
pub mod installer;
pub mod inventory;
pub mod manifest;
pub mod model;
pub mod monitor;
pub mod platform;
pub mod probe;
pub mod progress;
pub mod reconcile;
pub mod removal;
pub mod server;
pub mod session;
pub mod version;

pub use admin::{AdminClient, AdminStatus};
pub use config::Config;
pub use configsync::{plan_downloads, ConfigSync, ConfigSyncReport};
pub use error::{Error, Result};
pub use installer::{InstallOptions, ItemFailure, ItemOutcome, SyncExecutor, SyncReport};
pub use inventory::{InventoryScanner, ScanOptions};
pub use manifest::{ManifestCandidate, ManifestFetcher, ManifestSource};
pub use model::{
    ArchiveLocator, ConfigFileRecord, EntryStatus, LocalPackage, PackageDescriptor, PackagingKind,
    ReconciliationEntry,
};
pub use monitor::{ServerStatus, StatusMonitor};
pub use platform::{PlatformGate, PlatformUpdateReport, PlatformUpdater};
pub use probe::{EmbeddedVersionProbe, VersionProbe};
pub use progress::{ProgressSink, SyncEvent, SyncStage};
pub use reconcile::{reconcile, Reconciliation};
pub use removal::{OrphanRemover, RemovalReport};
pub use server::ServerClient;
pub use session::{ensure_client_present, ApplyOptions, ApplyReport, PrimaryAction, Session, Snapshot};
pub use version::{versions_match, DottedVersion};
