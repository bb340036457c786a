//! Error types for worldsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration failures. All of them are fatal for a pass and are raised
/// before any side effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading configuration files.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A launcher environment variable the instance context needs is unset.
    #[error("environment variable {var} is not set; run from the launcher or export it")]
    MissingVar { var: &'static str },

    /// The instance has no saves directory.
    #[error("saves directory not found at {path}")]
    SavesDirMissing { path: PathBuf },

    /// `config.yaml` could not be parsed.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A setting has a value outside its domain.
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// `dirs::home_dir()` returned `None` and `WORLDSYNC_HOME` is unset.
    #[error("cannot determine home directory; set $HOME or WORLDSYNC_HOME")]
    HomeNotFound,

    /// No usable machine name could be determined.
    #[error("could not determine a host name for this machine; set WORLDSYNC_HOST")]
    HostUnresolved,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
