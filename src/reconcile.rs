//! Reconciliation of the remote manifest against the local inventory
//!
//! [`reconcile`] is pure: it joins both sides by case-insensitive name and
//! classifies every package exactly once. Whether the installation is fully
//! synced is derived from the resulting entries and nowhere else.

use crate::model::{
    name_key, names_match, EntryStatus, LocalPackage, PackageDescriptor, ReconciliationEntry,
    ABSENT_VERSION,
};
use crate::version::versions_match;
use std::collections::{HashMap, HashSet};

/// The classified difference between server and disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    entries: Vec<ReconciliationEntry>,
}

impl Reconciliation {
    pub fn entries(&self) -> &[ReconciliationEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ReconciliationEntry> {
        self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ReconciliationEntry> {
        self.entries.iter().find(|e| names_match(&e.name, name))
    }

    /// Entries the sync executor has to install or update, in manifest order.
    pub fn pending(&self) -> Vec<ReconciliationEntry> {
        self.entries
            .iter()
            .filter(|e| e.status.needs_sync())
            .cloned()
            .collect()
    }

    /// Entries installed locally but gone from the server.
    pub fn orphaned(&self) -> Vec<ReconciliationEntry> {
        self.with_status(EntryStatus::Orphaned).cloned().collect()
    }

    pub fn with_status(&self, status: EntryStatus) -> impl Iterator<Item = &ReconciliationEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }

    pub fn count(&self, status: EntryStatus) -> usize {
        self.with_status(status).count()
    }

    /// Every server package is installed at exactly the advertised version and
    /// nothing extra is installed.
    pub fn is_fully_synced(&self) -> bool {
        self.entries.iter().all(|e| e.status == EntryStatus::UpToDate)
    }
}

/// Classify every package named on either side.
///
/// Remote entries come first in manifest order, then orphans in scan order.
/// Names that are empty or whitespace are ignored on both sides.
pub fn reconcile(remote: &[PackageDescriptor], local: &[LocalPackage]) -> Reconciliation {
    let mut local_by_name: HashMap<String, &LocalPackage> = HashMap::new();
    for package in local.iter().filter(|p| !p.name.trim().is_empty()) {
        local_by_name.entry(name_key(&package.name)).or_insert(package);
    }

    let mut entries = Vec::new();
    let mut remote_names = HashSet::new();

    for descriptor in remote.iter().filter(|d| !d.name.trim().is_empty()) {
        if !remote_names.insert(name_key(&descriptor.name)) {
            continue;
        }

        let installed = local_by_name.get(&name_key(&descriptor.name)).copied();
        let status = match installed {
            None => EntryStatus::NotInstalled,
            Some(local) if versions_match(&local.version, &descriptor.version) => {
                EntryStatus::UpToDate
            }
            Some(_) => EntryStatus::NeedsUpdate,
        };

        entries.push(ReconciliationEntry {
            name: descriptor.name.clone(),
            local_version: installed
                .map(|l| l.version.clone())
                .unwrap_or_else(|| ABSENT_VERSION.to_string()),
            remote_version: descriptor.version.clone(),
            status,
            kind: descriptor.kind,
            archive: descriptor.archive.clone(),
            install_folder_name: installed.and_then(|l| l.install_folder_name.clone()),
            local_path: installed.map(|l| l.path.clone()),
        });
    }

    let mut orphan_names = HashSet::new();
    for package in local.iter().filter(|p| !p.name.trim().is_empty()) {
        let folded = name_key(&package.name);
        if remote_names.contains(&folded) || !orphan_names.insert(folded) {
            continue;
        }

        entries.push(ReconciliationEntry {
            name: package.name.clone(),
            local_version: package.version.clone(),
            remote_version: ABSENT_VERSION.to_string(),
            status: EntryStatus::Orphaned,
            kind: package.kind,
            archive: None,
            install_folder_name: package.install_folder_name.clone(),
            local_path: Some(package.path.clone()),
        });
    }

    Reconciliation { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PackagingKind;
    use std::path::PathBuf;

    fn remote(name: &str, version: &str) -> PackageDescriptor {
        PackageDescriptor::new(name, version, PackagingKind::DirectoryBundle)
    }

    fn local(name: &str, version: &str) -> LocalPackage {
        LocalPackage {
            name: name.to_string(),
            version: version.to_string(),
            kind: PackagingKind::DirectoryBundle,
            install_folder_name: None,
            path: PathBuf::from("/plugins").join(name),
        }
    }

    #[test]
    fn test_not_installed() {
        let result = reconcile(&[remote("A", "1.0")], &[]);
        assert_eq!(result.entries().len(), 1);
        let a = &result.entries()[0];
        assert_eq!(a.status, EntryStatus::NotInstalled);
        assert_eq!(a.local_version, ABSENT_VERSION);
        assert_eq!(a.remote_version, "1.0");
        assert!(!result.is_fully_synced());
    }

    #[test]
    fn test_needs_update() {
        let result = reconcile(&[remote("A", "2.0")], &[local("A", "1.0")]);
        assert_eq!(result.entries()[0].status, EntryStatus::NeedsUpdate);
        assert_eq!(result.entries()[0].local_version, "1.0");
        assert!(!result.is_fully_synced());
        assert_eq!(result.pending().len(), 1);
    }

    #[test]
    fn test_orphaned() {
        let result = reconcile(&[], &[local("B", "1.0")]);
        let b = &result.entries()[0];
        assert_eq!(b.status, EntryStatus::Orphaned);
        assert_eq!(b.remote_version, ABSENT_VERSION);
        assert_eq!(result.orphaned().len(), 1);
        assert!(result.pending().is_empty());
        assert!(!result.is_fully_synced());
    }

    #[test]
    fn test_up_to_date_is_fully_synced() {
        let result = reconcile(
            &[remote("A", "1.0"), remote("B", "beta-2")],
            &[local("b", "beta-2"), local("A", "1.0")],
        );
        assert_eq!(result.count(EntryStatus::UpToDate), 2);
        assert!(result.is_fully_synced());
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        let result = reconcile(&[remote("MyMod", "1")], &[local("mymod", "1")]);
        assert_eq!(result.entries().len(), 1);
        assert_eq!(result.entries()[0].status, EntryStatus::UpToDate);
        assert_eq!(result.entries()[0].name, "MyMod");
    }

    #[test]
    fn test_non_ascii_names_join_and_look_up() {
        let result = reconcile(&[remote("Ärger", "2")], &[local("äRGER", "1")]);
        assert_eq!(result.entries().len(), 1);
        assert_eq!(result.entries()[0].status, EntryStatus::NeedsUpdate);
        assert_eq!(result.get("ÄRGER").map(|e| e.local_version.as_str()), Some("1"));
        assert_eq!(result.get("ärger").map(|e| e.remote_version.as_str()), Some("2"));
    }

    #[test]
    fn test_version_match_is_case_sensitive() {
        let result = reconcile(&[remote("A", "1.0-RC")], &[local("A", "1.0-rc")]);
        assert_eq!(result.entries()[0].status, EntryStatus::NeedsUpdate);
    }

    #[test]
    fn test_disjoint_sets_cover_union() {
        let remote_set = vec![remote("R1", "1"), remote("R2", "1"), remote("R3", "1")];
        let local_set = vec![local("L1", "1"), local("L2", "1")];
        let result = reconcile(&remote_set, &local_set);
        assert_eq!(result.entries().len(), 5);
        assert_eq!(result.count(EntryStatus::NotInstalled), 3);
        assert_eq!(result.count(EntryStatus::Orphaned), 2);
    }

    #[test]
    fn test_blank_names_are_skipped() {
        let result = reconcile(
            &[remote("", "1"), remote("   ", "1"), remote("A", "1")],
            &[local(" ", "1")],
        );
        assert_eq!(result.entries().len(), 1);
        assert_eq!(result.entries()[0].name, "A");
    }

    #[test]
    fn test_duplicate_names_yield_one_entry() {
        let result = reconcile(
            &[remote("A", "1"), remote("a", "2")],
            &[local("X", "1"), local("x", "2")],
        );
        assert_eq!(result.entries().len(), 2);
        assert_eq!(result.get("a").unwrap().remote_version, "1");
        assert_eq!(result.get("X").unwrap().local_version, "1");
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let remote_set = vec![remote("A", "1"), remote("B", "2")];
        let local_set = vec![local("B", "1"), local("C", "1")];
        assert_eq!(
            reconcile(&remote_set, &local_set),
            reconcile(&remote_set, &local_set)
        );
    }

    #[test]
    fn test_entry_carries_local_install_folder() {
        let mut manual = local("Radar", "1");
        manual.install_folder_name = Some("radar-by-someone".to_string());
        let result = reconcile(&[remote("Radar", "2")], &[manual]);
        let entry = &result.entries()[0];
        assert_eq!(entry.install_folder(), "radar-by-someone");
        assert_eq!(entry.local_path, Some(PathBuf::from("/plugins/Radar")));
    }
}
