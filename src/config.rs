//! Persisted client configuration
//!
//! The configuration is a flat JSON object stored as `modsync.json` next to
//! the executable (the game root, in a normal install). A missing file means
//! built-in defaults; nothing is written until the user changes a value.
//!
//! # Examples
//!
//! ```no_run
//! use modsync::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::load()?;
//! println!("Server: {}", config.base_url());
//!
//! config.server_port = 6970;
//! config.save()?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "modsync.json";
pub const LOG_FILE_NAME: &str = "modsync.log";

/// Client configuration (`modsync.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Host name or IP of the mod server
    pub server_address: String,

    /// Port of the mod server
    pub server_port: u16,

    /// Base URL of the platform server (version + update endpoints)
    pub platform_server_address: String,

    /// Opaque credential passed to the admin endpoints
    pub secret: String,

    /// Game root; defaults to the directory holding the executable
    pub game_root: Option<PathBuf>,

    /// Package install directory, relative to the game root
    pub mods_dir: PathBuf,

    /// Loose configuration file directory, relative to the game root
    pub config_dir: PathBuf,

    /// Client launcher, relative to the game root
    pub client_path: PathBuf,

    /// Manifest location relative to each server base
    pub manifest_path: String,

    /// Additional server bases tried, in order, after the primary one
    pub mirrors: Vec<String>,

    /// Extension of recognized binary artifacts (without the dot)
    pub artifact_extension: String,

    /// Name of the per-package descriptor file
    pub sidecar_file_name: String,

    /// Name of the per-package user configuration folder kept across reinstalls
    pub config_subfolder: String,

    /// Package names the scanner never reports
    pub excluded_packages: Vec<String>,

    /// Top-level folders under the install directory the scanner never reports
    pub excluded_folders: Vec<String>,

    /// Loose configuration files left out of the config sync
    pub excluded_config_files: Vec<String>,

    /// Path segment of the platform endpoints (`{platform}/version`)
    pub platform_name: String,

    /// Binary whose embedded version is the installed platform version
    pub platform_core_binary: PathBuf,

    /// Files in the platform update archive that are never extracted
    pub platform_update_skip: Vec<String>,

    /// Timeout for manifest and status requests
    pub fetch_timeout_secs: u64,

    /// Timeout for archive downloads
    pub download_timeout_secs: u64,

    /// Interval of the background reachability check
    pub status_poll_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 25569,
            platform_server_address: "http://127.0.0.1:6969".to_string(),
            secret: String::new(),
            game_root: None,
            mods_dir: PathBuf::from("BepInEx").join("plugins"),
            config_dir: PathBuf::from("BepInEx").join("config"),
            client_path: PathBuf::from("SPT").join("SPT.Launcher.exe"),
            manifest_path: "PluginVersions.json".to_string(),
            mirrors: Vec::new(),
            artifact_extension: "dll".to_string(),
            sidecar_file_name: "modinfo.json".to_string(),
            config_subfolder: "config".to_string(),
            excluded_packages: vec![
                "spt-common".to_string(),
                "spt-core".to_string(),
                "spt-custom".to_string(),
                "spt-debugging".to_string(),
                "spt-reflection".to_string(),
                "spt-singleplayer".to_string(),
            ],
            excluded_folders: vec!["spt".to_string()],
            excluded_config_files: vec![
                "BepInEx.cfg".to_string(),
                "com.bepis.bepinex.configurationmanager.cfg".to_string(),
                "com.spt.core.cfg".to_string(),
            ],
            platform_name: "spt".to_string(),
            platform_core_binary: PathBuf::from("BepInEx")
                .join("plugins")
                .join("spt")
                .join("spt-core.dll"),
            platform_update_skip: vec!["winhttp.dll".to_string()],
            fetch_timeout_secs: 5,
            download_timeout_secs: 2 * 60 * 60,
            status_poll_secs: 5 * 60,
        }
    }
}

impl Config {
    /// Directory holding the config and log files
    ///
    /// Uses MODSYNC_CONFIG_DIR if set, otherwise the executable's directory
    pub fn config_dir_path() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("MODSYNC_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }

        let exe = std::env::current_exe()?;
        exe.parent()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| Error::Other("Could not determine executable directory".to_string()))
    }

    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir_path()?.join(CONFIG_FILE_NAME))
    }

    /// Load config from file, or defaults if it doesn't exist
    ///
    /// Environment variable overrides:
    /// - `MODSYNC_SECRET`: Overrides `secret` for the admin endpoints
    /// - `MODSYNC_CONFIG_DIR`: Overrides the config directory location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;

        let mut config = if !path.exists() {
            Self::default()
        } else {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                Error::InvalidConfig(format!("{}: {}", path.display(), e))
            })?
        };

        if let Ok(secret) = std::env::var("MODSYNC_SECRET") {
            if !secret.is_empty() {
                config.secret = secret;
            }
        }

        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Base URL of the mod server, e.g. `http://127.0.0.1:25569`
    pub fn base_url(&self) -> String {
        let address = self.server_address.trim().trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            format!("{}:{}", address, self.server_port)
        } else {
            format!("http://{}:{}", address, self.server_port)
        }
    }

    /// Base URL of the platform server
    pub fn platform_base_url(&self) -> String {
        self.platform_server_address
            .trim()
            .trim_end_matches('/')
            .to_string()
    }

    /// Server bases to try for the manifest, primary first
    pub fn server_bases(&self) -> Vec<String> {
        let mut bases = vec![self.base_url()];
        for mirror in &self.mirrors {
            let mirror = mirror.trim().trim_end_matches('/');
            if !mirror.is_empty() && !bases.iter().any(|b| b == mirror) {
                bases.push(mirror.to_string());
            }
        }
        bases
    }

    pub fn game_root(&self) -> Result<PathBuf> {
        match &self.game_root {
            Some(root) => Ok(root.clone()),
            None => Self::config_dir_path(),
        }
    }

    pub fn mods_path(&self) -> Result<PathBuf> {
        Ok(self.game_root()?.join(&self.mods_dir))
    }

    pub fn config_files_path(&self) -> Result<PathBuf> {
        Ok(self.game_root()?.join(&self.config_dir))
    }

    pub fn client_executable(&self) -> Result<PathBuf> {
        Ok(self.game_root()?.join(&self.client_path))
    }

    pub fn platform_binary(&self) -> Result<PathBuf> {
        Ok(self.game_root()?.join(&self.platform_core_binary))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs.max(1))
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs.max(1))
    }

    /// Manifest URL on every server base, primary first
    pub fn manifest_candidates(&self) -> Vec<String> {
        let path = self.manifest_path.trim_start_matches('/');
        self.server_bases()
            .into_iter()
            .map(|base| format!("{}/{}", base, path))
            .collect()
    }

    /// Names of all persisted keys, as written in `modsync.json`
    pub fn keys() -> Vec<String> {
        match serde_json::to_value(Config::default()) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Set one key from its textual form.
    ///
    /// `key` is the camelCase name used in `modsync.json`. Lists take a
    /// comma-separated value; an empty value clears an optional path.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        let map = json
            .as_object_mut()
            .ok_or_else(|| Error::InvalidConfig("configuration is not an object".to_string()))?;

        let current = map
            .get(key)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown key '{}'", key)))?;

        let parsed = match current {
            _ if key == "gameRoot" && value.trim().is_empty() => serde_json::Value::Null,
            serde_json::Value::Number(_) => {
                let number: u64 = value.trim().parse().map_err(|_| {
                    Error::InvalidConfig(format!("'{}' expects a number, got '{}'", key, value))
                })?;
                serde_json::Value::from(number)
            }
            serde_json::Value::Array(_) => serde_json::Value::from(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
            ),
            _ => serde_json::Value::String(value.to_string()),
        };

        map.insert(key.to_string(), parsed);
        *self = serde_json::from_value(json)
            .map_err(|e| Error::InvalidConfig(format!("invalid value for '{}': {}", key, e)))?;
        Ok(())
    }
}
