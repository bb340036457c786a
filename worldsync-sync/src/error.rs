//! Error types for worldsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use worldsync_core::{ConfigError, Role};
use worldsync_remote::{PropertyError, RemoteError};

use crate::replace::ReplaceStage;

/// All errors that can arise from a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing instance context or saves root. Fatal for the pass.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure talking to the remote store.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A remote record that cannot participate in reconciliation.
    #[error("remote record {id} rejected: {reason}")]
    Integrity { id: String, reason: String },

    /// Packing or unpacking a world archive failed.
    #[error("archive error at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backup archive read back differs from what was packed.
    #[error("backup {path} failed verification (expected sha256 {expected}, found {actual})")]
    BackupMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// An atomic replace failed and was rolled back.
    #[error("replacing world '{world}' failed while {stage}: {source}")]
    Replace {
        world: String,
        stage: ReplaceStage,
        #[source]
        source: Box<SyncError>,
    },

    /// An atomic replace failed and rolling it back failed as well.
    #[error(
        "replacing world '{world}' failed while {stage} ({cause}); rollback also failed: {rollback}"
    )]
    RollbackFailed {
        world: String,
        stage: ReplaceStage,
        cause: Box<SyncError>,
        rollback: Box<SyncError>,
    },

    /// Another pass holds the lock on this saves root.
    #[error("another worldsync pass is running against {path}")]
    Locked { path: PathBuf },

    /// The remote index holds more than one record where at most one may
    /// exist.
    #[error("remote index is inconsistent: {count} {role} records for save '{save}' of instance '{instance}'")]
    AmbiguousIndex {
        instance: String,
        save: String,
        role: Role,
        count: usize,
    },
}

impl SyncError {
    pub(crate) fn integrity(id: impl Into<String>, reason: PropertyError) -> Self {
        SyncError::Integrity {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn archive_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Archive {
        path: path.into(),
        source,
    }
}
