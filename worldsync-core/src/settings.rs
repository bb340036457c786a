//! Process settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.worldsync/            (WORLDSYNC_HOME overrides)
//!   config.yaml            (optional, every field optional)
//!   drive-token            (optional bearer token for the Drive store)
//!   logs/worldsync.log
//! ```
//!
//! # API pattern
//!
//! `load_at(home, lookup)` takes an explicit home and environment lookup and is
//! what tests use; `load()` derives both from the process.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

pub const ENV_HOME: &str = "WORLDSYNC_HOME";
pub const ENV_ROOT_NAME: &str = "WORLDSYNC_ROOT_NAME";
pub const ENV_STORE: &str = "WORLDSYNC_STORE";
pub const ENV_FOLDER_STORE: &str = "WORLDSYNC_FOLDER_STORE";
pub const ENV_WORKERS: &str = "WORLDSYNC_WORKERS";
pub const ENV_LOG_LEVEL: &str = "WORLDSYNC_LOG_LEVEL";
pub const ENV_CLEAR_LOG: &str = "WORLDSYNC_CLEAR_LOG";

pub const DEFAULT_ROOT_NAME: &str = "MinecraftSync";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Which remote store backs the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// Google Drive v3.
    Drive,
    /// A plain directory used as blob store (shared or network folder).
    Folder { path: PathBuf },
}

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub home: PathBuf,
    /// Name of the remote folder that holds every record.
    pub root_name: String,
    pub store: StoreKind,
    /// Upper bound on concurrently processed worlds.
    pub workers: usize,
    pub log_level: String,
    pub clear_log_on_start: bool,
}

/// On-disk `config.yaml` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub root_name: Option<String>,
    pub store: Option<String>,
    pub folder_store: Option<PathBuf>,
    pub workers: Option<usize>,
    pub log_level: Option<String>,
    pub clear_log_on_start: Option<bool>,
}

impl Settings {
    /// Load from `WORLDSYNC_HOME` (or `~/.worldsync`) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let home = home_from(&lookup)?;
        Self::load_at(&home, lookup)
    }

    /// Load with an explicit home and environment lookup.
    ///
    /// Creates `home` (mode `0700`) when absent.
    pub fn load_at<F>(home: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !home.exists() {
            std::fs::create_dir_all(home).map_err(|e| io_err(home, e))?;
            set_dir_permissions(home)?;
        }

        let file = load_file_at(home)?;
        let env = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let root_name = env(ENV_ROOT_NAME)
            .or(file.root_name)
            .unwrap_or_else(|| DEFAULT_ROOT_NAME.to_string());

        let store_name = env(ENV_STORE)
            .or(file.store)
            .unwrap_or_else(|| "drive".to_string());
        let folder = env(ENV_FOLDER_STORE).map(PathBuf::from).or(file.folder_store);
        let store = match store_name.to_ascii_lowercase().as_str() {
            "drive" => StoreKind::Drive,
            "folder" => StoreKind::Folder {
                path: folder.ok_or(ConfigError::Invalid {
                    key: "folder_store",
                    reason: "folder store selected but no folder path configured".to_string(),
                })?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "store",
                    reason: format!("unknown store '{other}'; expected drive or folder"),
                })
            }
        };

        let workers = match env(ENV_WORKERS) {
            Some(raw) => raw.parse::<usize>().map_err(|_| ConfigError::Invalid {
                key: "workers",
                reason: format!("'{raw}' is not a positive integer"),
            })?,
            None => file.workers.unwrap_or(DEFAULT_WORKERS),
        };
        if workers == 0 {
            return Err(ConfigError::Invalid {
                key: "workers",
                reason: "must be >= 1".to_string(),
            });
        }

        let log_level = env(ENV_LOG_LEVEL)
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let clear_log_on_start = match env(ENV_CLEAR_LOG) {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                key: "clear_log_on_start",
                reason: format!("'{raw}' is not a boolean"),
            })?,
            None => file.clear_log_on_start.unwrap_or(false),
        };

        Ok(Self {
            home: home.to_path_buf(),
            root_name,
            store,
            workers,
            log_level,
            clear_log_on_start,
        })
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("worldsync.log")
    }

    pub fn drive_token_path(&self) -> PathBuf {
        self.home.join("drive-token")
    }
}

/// `<home>/config.yaml`; pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join("config.yaml")
}

/// Read `config.yaml`; a missing file yields defaults.
pub fn load_file_at(home: &Path) -> Result<SettingsFile, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if raw.trim().is_empty() {
        return Ok(SettingsFile::default());
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

fn home_from<F>(lookup: &F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(custom) = lookup(ENV_HOME).filter(|v| !v.trim().is_empty()) {
        return Ok(PathBuf::from(custom.trim()));
    }
    dirs::home_dir()
        .map(|h| h.join(".worldsync"))
        .ok_or(ConfigError::HomeNotFound)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "true" | "TRUE" | "yes" | "on" => Some(true),
        "0" | "false" | "FALSE" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
