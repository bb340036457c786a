//! Advisory lock serializing passes per saves root.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{io_err, SyncError};

pub const LOCK_FILE_NAME: &str = ".worldsync.lock";

/// Held for the duration of a pass; released on drop.
#[derive(Debug)]
pub struct SavesLock {
    file: File,
    path: PathBuf,
}

impl SavesLock {
    /// Take the exclusive lock on `<saves>/.worldsync.lock` without waiting.
    pub fn acquire(saves: &Path) -> Result<Self, SyncError> {
        let path = saves.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("locked {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || is_contended(&e) => {
                Err(SyncError::Locked { path })
            }
            Err(e) => Err(io_err(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SavesLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("could not release {}: {}", self.path.display(), e);
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
