//! Package and configuration-file value types
//!
//! Everything here is a plain value owned by the refresh cycle that built it.
//! Remote truth arrives as [`PackageDescriptor`] / [`ConfigFileRecord`],
//! local truth as [`LocalPackage`], and the reconciler joins the two into
//! [`ReconciliationEntry`] rows.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Placeholder shown for a version that does not exist on one side.
pub const ABSENT_VERSION: &str = "-";

/// Folded form of a package or file name; the single rule for every
/// case-insensitive name comparison.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn names_match(a: &str, b: &str) -> bool {
    name_key(a) == name_key(b)
}

/// How a package lands on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackagingKind {
    /// One binary artifact placed directly in the install root
    SingleFile,
    /// A folder under the install root holding one or more files
    DirectoryBundle,
}

impl PackagingKind {
    pub fn from_folder_flag(is_folder: bool) -> Self {
        if is_folder {
            PackagingKind::DirectoryBundle
        } else {
            PackagingKind::SingleFile
        }
    }
}

impl fmt::Display for PackagingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackagingKind::SingleFile => write!(f, "file"),
            PackagingKind::DirectoryBundle => write!(f, "folder"),
        }
    }
}

/// Where the archive for a package can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArchiveLocator {
    /// Archive file name as published by the server; downloaded through
    /// the `mods/{name}` endpoint
    FileName(String),
    /// Explicit download URL, absolute or relative to the server base
    Url(String),
}

/// A package as advertised by the server manifest.
///
/// Field names differ between server generations (`Name` vs `name`,
/// `fileName` vs `downloadUrl`); all spellings map onto this shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireDescriptor")]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    pub archive: Option<ArchiveLocator>,
    pub kind: PackagingKind,
}

impl PackageDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>, kind: PackagingKind) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            archive: None,
            kind,
        }
    }

    pub fn with_archive(mut self, archive: ArchiveLocator) -> Self {
        self.archive = Some(archive);
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDescriptor {
    #[serde(default, alias = "Name")]
    name: Option<String>,
    #[serde(default, alias = "Version")]
    version: Option<String>,
    #[serde(default, alias = "FileName")]
    file_name: Option<String>,
    #[serde(default, alias = "DownloadUrl")]
    download_url: Option<String>,
    #[serde(default, alias = "IsFolderMod")]
    is_folder_mod: Option<bool>,
}

impl From<WireDescriptor> for PackageDescriptor {
    fn from(wire: WireDescriptor) -> Self {
        let archive = match (wire.download_url, wire.file_name) {
            (Some(url), _) if !url.trim().is_empty() => Some(ArchiveLocator::Url(url)),
            (_, Some(file)) if !file.trim().is_empty() => Some(ArchiveLocator::FileName(file)),
            _ => None,
        };

        Self {
            name: wire.name.unwrap_or_default().trim().to_string(),
            version: wire.version.unwrap_or_default(),
            archive,
            kind: PackagingKind::from_folder_flag(wire.is_folder_mod.unwrap_or(false)),
        }
    }
}

/// A package found on disk by the inventory scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPackage {
    pub name: String,
    pub version: String,
    pub kind: PackagingKind,
    /// Set when the folder on disk is named differently from the package
    pub install_folder_name: Option<String>,
    /// The folder (bundle) or file (single-file) that makes up the package
    pub path: PathBuf,
}

impl LocalPackage {
    /// Name of the directory or file under the install root.
    pub fn install_folder(&self) -> &str {
        self.install_folder_name.as_deref().unwrap_or(&self.name)
    }
}

/// Classification of one package after comparing both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntryStatus {
    UpToDate,
    NeedsUpdate,
    NotInstalled,
    /// Installed locally but no longer on the server
    Orphaned,
}

impl EntryStatus {
    /// True when the sync executor has work to do for this entry.
    pub fn needs_sync(self) -> bool {
        matches!(self, EntryStatus::NeedsUpdate | EntryStatus::NotInstalled)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryStatus::UpToDate => "Up to date",
            EntryStatus::NeedsUpdate => "Update",
            EntryStatus::NotInstalled => "Not installed",
            EntryStatus::Orphaned => "Remove",
        };
        f.write_str(label)
    }
}

/// One row of the reconciliation: a package name seen on either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationEntry {
    pub name: String,
    pub local_version: String,
    pub remote_version: String,
    pub status: EntryStatus,
    pub kind: PackagingKind,
    pub archive: Option<ArchiveLocator>,
    pub install_folder_name: Option<String>,
    pub local_path: Option<PathBuf>,
}

impl ReconciliationEntry {
    /// Name of the directory or file this package occupies under the install root.
    pub fn install_folder(&self) -> &str {
        self.install_folder_name.as_deref().unwrap_or(&self.name)
    }
}

/// A loose configuration file, either as listed by the server or as found locally.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFileRecord {
    #[serde(alias = "FileName")]
    pub file_name: String,
    #[serde(
        rename = "lastModified",
        alias = "LastModified",
        alias = "lastModifiedUtc",
        deserialize_with = "deserialize_timestamp"
    )]
    pub last_modified_utc: DateTime<Utc>,
    #[serde(default, alias = "IsEnforced")]
    pub is_enforced: bool,
}

impl ConfigFileRecord {
    pub fn new(file_name: impl Into<String>, last_modified_utc: DateTime<Utc>, is_enforced: bool) -> Self {
        Self {
            file_name: file_name.into(),
            last_modified_utc,
            is_enforced,
        }
    }

    /// File name without its extension, as used by the `configs/` endpoint.
    pub fn stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(0) | None => &self.file_name,
            Some(pos) => &self.file_name[..pos],
        }
    }
}

/// Accepts RFC 3339 as well as the zone-less `2024-05-01T12:00:00.123`
/// form some servers emit; the latter is taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_names_match_folds_unicode() {
        assert!(names_match("Ärger", "äRGER"));
        assert!(names_match(" Radar ", "RADAR"));
        assert!(!names_match("Radar", "Radar2"));
        assert_eq!(name_key("ÖKO"), "öko");
    }

    #[test]
    fn test_descriptor_camel_case() {
        let json = r#"{"name":"MyMod","version":"1.2.0","fileName":"MyMod.zip","isFolderMod":true}"#;
        let desc: PackageDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.name, "MyMod");
        assert_eq!(desc.version, "1.2.0");
        assert_eq!(desc.kind, PackagingKind::DirectoryBundle);
        assert_eq!(desc.archive, Some(ArchiveLocator::FileName("MyMod.zip".to_string())));
    }

    #[test]
    fn test_descriptor_pascal_case() {
        let json = r#"{"Name":"Other","Version":"3","FileName":"Other.zip","IsFolderMod":false}"#;
        let desc: PackageDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.name, "Other");
        assert_eq!(desc.kind, PackagingKind::SingleFile);
    }

    #[test]
    fn test_descriptor_download_url_wins() {
        let json = r#"{"name":"A","version":"1","fileName":"A.zip","downloadUrl":"https://cdn.example/A.zip"}"#;
        let desc: PackageDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(
            desc.archive,
            Some(ArchiveLocator::Url("https://cdn.example/A.zip".to_string()))
        );
    }

    #[test]
    fn test_descriptor_missing_fields() {
        let desc: PackageDescriptor = serde_json::from_str(r#"{"version":null}"#).unwrap();
        assert!(desc.name.is_empty());
        assert!(desc.version.is_empty());
        assert!(desc.archive.is_none());
    }

    #[test]
    fn test_config_record_timestamps() {
        let json = r#"[
            {"fileName":"a.cfg","lastModified":"2024-05-01T12:00:00Z","isEnforced":true},
            {"FileName":"b.cfg","LastModified":"2024-05-01T12:00:00.5"}
        ]"#;
        let records: Vec<ConfigFileRecord> = serde_json::from_str(json).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(records[0].last_modified_utc, expected);
        assert!(records[0].is_enforced);
        assert!(!records[1].is_enforced);
        assert_eq!(records[1].last_modified_utc.timestamp(), expected.timestamp());
    }

    #[test]
    fn test_config_record_stem() {
        let at = Utc::now();
        assert_eq!(ConfigFileRecord::new("com.x.cfg", at, false).stem(), "com.x");
        assert_eq!(ConfigFileRecord::new("noext", at, false).stem(), "noext");
        assert_eq!(ConfigFileRecord::new(".hidden", at, false).stem(), ".hidden");
    }

    #[test]
    fn test_status_needs_sync() {
        assert!(EntryStatus::NeedsUpdate.needs_sync());
        assert!(EntryStatus::NotInstalled.needs_sync());
        assert!(!EntryStatus::UpToDate.needs_sync());
        assert!(!EntryStatus::Orphaned.needs_sync());
    }
}
