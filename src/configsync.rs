//! Loose configuration file sync
//!
//! Unlike packages, configuration files carry no version. The server lists
//! each file with its modification time and whether it is enforced, and the
//! decision of what to download is made by [`plan_downloads`]:
//!
//! - an enforced file is downloaded when it is missing locally or its local
//!   modification time differs from the server's (compared to the second);
//! - a non-enforced file is downloaded only when it is missing and the local
//!   and remote file counts differ, i.e. on a first or partial install.
//!
//! Files named in the exclusion list are ignored on both sides. Unlike the
//! package sync, a failed download is an error for the whole run.

use crate::config::Config;
use crate::fsutil::{remove_path, scratch_name};
use crate::model::{name_key, names_match, ConfigFileRecord};
use crate::server::ServerClient;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Location of the config file list on the server
pub const CONFIG_LIST_PATH: &str = "ConfigFiles.json";

/// Which remote files must be fetched, given both listings.
pub fn plan_downloads(
    remote: &[ConfigFileRecord],
    local: &[ConfigFileRecord],
    excluded: &[String],
) -> Vec<ConfigFileRecord> {
    let considered = |r: &&ConfigFileRecord| {
        !r.file_name.trim().is_empty() && !excluded.iter().any(|e| names_match(e, &r.file_name))
    };

    let remote: Vec<&ConfigFileRecord> = remote.iter().filter(considered).collect();
    let local: HashMap<String, &ConfigFileRecord> = local
        .iter()
        .filter(considered)
        .map(|r| (name_key(&r.file_name), r))
        .collect();

    let counts_differ = remote.len() != local.len();

    remote
        .into_iter()
        .filter(|r| match local.get(&name_key(&r.file_name)) {
            None => r.is_enforced || counts_differ,
            Some(l) => r.is_enforced && !same_second(&l.last_modified_utc, &r.last_modified_utc),
        })
        .cloned()
        .collect()
}

fn same_second(a: &DateTime<Utc>, b: &DateTime<Utc>) -> bool {
    a.timestamp() == b.timestamp()
}

/// Files directly inside `dir`, with their modification times.
///
/// A missing directory has no files.
pub fn scan_local(dir: &Path) -> Result<Vec<ConfigFileRecord>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        records.push(ConfigFileRecord::new(
            entry.file_name().to_string_lossy().to_string(),
            DateTime::<Utc>::from(metadata.modified()?),
            false,
        ));
    }

    records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(records)
}

/// Files fetched by one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigSyncReport {
    pub downloaded: Vec<String>,
}

pub struct ConfigSync<'a> {
    client: &'a ServerClient,
    config_dir: PathBuf,
    excluded: Vec<String>,
}

impl<'a> ConfigSync<'a> {
    pub fn new(client: &'a ServerClient, config_dir: impl Into<PathBuf>, excluded: Vec<String>) -> Self {
        Self {
            client,
            config_dir: config_dir.into(),
            excluded,
        }
    }

    pub fn from_config(client: &'a ServerClient, config: &Config) -> Result<Self> {
        Ok(Self::new(
            client,
            config.config_files_path()?,
            config.excluded_config_files.clone(),
        ))
    }

    /// The server's file list; empty when it cannot be fetched or parsed.
    pub fn fetch_remote(&self) -> Vec<ConfigFileRecord> {
        let url = self.client.endpoint(&[CONFIG_LIST_PATH]);
        match self.client.get_json::<Option<Vec<ConfigFileRecord>>>(&url) {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Failed to fetch config file list from {}: {}", url, e);
                Vec::new()
            }
        }
    }

    /// Files that the next [`run`](Self::run) would download.
    pub fn plan(&self) -> Result<Vec<ConfigFileRecord>> {
        let remote = self.fetch_remote();
        let local = scan_local(&self.config_dir)?;
        Ok(plan_downloads(&remote, &local, &self.excluded))
    }

    /// Download every planned file, stopping at the first failure.
    pub fn run(&self) -> Result<ConfigSyncReport> {
        let mut report = ConfigSyncReport::default();

        for record in self.plan()? {
            self.download(&record).map_err(|e| {
                Error::Other(format!("Config file '{}' could not be synced: {}", record.file_name, e))
            })?;
            tracing::info!("Synced config file {}", record.file_name);
            report.downloaded.push(record.file_name);
        }

        Ok(report)
    }

    fn download(&self, record: &ConfigFileRecord) -> Result<()> {
        if Path::new(&record.file_name).file_name() != Some(OsStr::new(&record.file_name)) {
            return Err(Error::Other(format!("unsafe file name '{}'", record.file_name)));
        }

        fs::create_dir_all(&self.config_dir)?;
        let target = self.config_dir.join(&record.file_name);
        let partial = self
            .config_dir
            .join(format!(".{}", scratch_name(&record.file_name, Some("part"))));

        let url = self.client.endpoint(&["configs", record.stem()]);
        let written = self
            .client
            .download_to(&url, &partial, |_, _| {})
            .and_then(|_| {
                fs::rename(&partial, &target)?;
                Ok(())
            });

        if let Err(e) = written {
            let _ = remove_path(&partial);
            return Err(e);
        }

        // local time must match the server's or the file is fetched again next run
        let file = File::options().write(true).open(&target)?;
        file.set_modified(SystemTime::from(record.last_modified_utc))?;
        Ok(())
    }
}
