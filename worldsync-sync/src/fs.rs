//! Local filesystem collaborator.
//!
//! The engine touches the disk only through [`WorldFs`] so that every step of
//! the atomic replace can be made to fail in tests.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;

use crate::archive;
use crate::error::{io_err, SyncError};

/// One first-level directory of a saves root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: PathBuf,
    pub mod_time: DateTime<Utc>,
}

pub trait WorldFs: Send + Sync {
    /// First-level directories of `root`. Other entries are ignored.
    fn list_directories(&self, root: &Path) -> Result<Vec<DirEntryInfo>, SyncError>;

    fn pack_directory(&self, path: &Path) -> Result<Vec<u8>, SyncError>;

    /// Unpack the archive file at `archive` into `dest`.
    fn unpack_archive(&self, archive: &Path, dest: &Path) -> Result<(), SyncError>;

    fn mod_time(&self, path: &Path) -> Result<DateTime<Utc>, SyncError>;

    fn set_mod_time(&self, path: &Path, time: DateTime<Utc>) -> Result<(), SyncError>;

    fn remove_tree(&self, path: &Path) -> Result<(), SyncError>;

    fn rename_tree(&self, src: &Path, dst: &Path) -> Result<(), SyncError>;

    /// Copy `reader` into a new file at `dest`; returns the byte count.
    fn write_stream(&self, reader: &mut dyn Read, dest: &Path) -> Result<u64, SyncError>;

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), SyncError>;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, SyncError>;

    fn remove_file(&self, path: &Path) -> Result<(), SyncError>;

    fn rename_file(&self, src: &Path, dst: &Path) -> Result<(), SyncError>;

    fn exists(&self, path: &Path) -> bool;
}

/// The real disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl WorldFs for DiskFs {
    fn list_directories(&self, root: &Path) -> Result<Vec<DirEntryInfo>, SyncError> {
        let entries = std::fs::read_dir(root).map_err(|e| io_err(root, e))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(root, e))?;
            let path = entry.path();
            let metadata = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry {}: {}", path.display(), e);
                    continue;
                }
            };
            if !metadata.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("skipping non UTF-8 directory name {}", path.display());
                continue;
            };
            let modified = metadata.modified().map_err(|e| io_err(&path, e))?;
            dirs.push(DirEntryInfo {
                name,
                path,
                mod_time: DateTime::<Utc>::from(modified),
            });
        }
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(dirs)
    }

    fn pack_directory(&self, path: &Path) -> Result<Vec<u8>, SyncError> {
        archive::pack_directory(path)
    }

    fn unpack_archive(&self, archive: &Path, dest: &Path) -> Result<(), SyncError> {
        let file = File::open(archive).map_err(|e| io_err(archive, e))?;
        archive::unpack_into(BufReader::new(file), dest)
    }

    fn mod_time(&self, path: &Path) -> Result<DateTime<Utc>, SyncError> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn set_mod_time(&self, path: &Path, time: DateTime<Utc>) -> Result<(), SyncError> {
        let ft = FileTime::from_unix_time(time.timestamp(), time.timestamp_subsec_nanos());
        filetime::set_file_mtime(path, ft).map_err(|e| io_err(path, e))
    }

    fn remove_tree(&self, path: &Path) -> Result<(), SyncError> {
        std::fs::remove_dir_all(path).map_err(|e| io_err(path, e))
    }

    fn rename_tree(&self, src: &Path, dst: &Path) -> Result<(), SyncError> {
        std::fs::rename(src, dst).map_err(|e| io_err(dst, e))
    }

    fn write_stream(&self, reader: &mut dyn Read, dest: &Path) -> Result<u64, SyncError> {
        let mut file = File::create(dest).map_err(|e| io_err(dest, e))?;
        let written = std::io::copy(reader, &mut file).map_err(|e| io_err(dest, e))?;
        file.flush().map_err(|e| io_err(dest, e))?;
        file.sync_all().map_err(|e| io_err(dest, e))?;
        Ok(written)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
        let mut file = File::create(path).map_err(|e| io_err(path, e))?;
        file.write_all(bytes).map_err(|e| io_err(path, e))?;
        file.sync_all().map_err(|e| io_err(path, e))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, SyncError> {
        std::fs::read(path).map_err(|e| io_err(path, e))
    }

    fn remove_file(&self, path: &Path) -> Result<(), SyncError> {
        std::fs::remove_file(path).map_err(|e| io_err(path, e))
    }

    fn rename_file(&self, src: &Path, dst: &Path) -> Result<(), SyncError> {
        std::fs::rename(src, dst).map_err(|e| io_err(dst, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lists_only_directories_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("Zeta")).unwrap();
        fs::create_dir(tmp.path().join("Alpha")).unwrap();
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        fs::write(tmp.path().join("Alpha.old.tar.gz"), "x").unwrap();

        let dirs = DiskFs.list_directories(tmp.path()).unwrap();
        let names: Vec<_> = dirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Zeta"]);
        assert_eq!(dirs[0].path, tmp.path().join("Alpha"));
    }

    #[test]
    fn directory_mod_time_roundtrips_exactly() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Base");
        fs::create_dir(&dir).unwrap();
        let t = Utc.timestamp_millis_opt(1_700_000_123_456).unwrap();
        DiskFs.set_mod_time(&dir, t).unwrap();
        assert_eq!(DiskFs.mod_time(&dir).unwrap(), t);
        assert_eq!(DiskFs.list_directories(tmp.path()).unwrap()[0].mod_time, t);
    }

    #[test]
    fn write_stream_copies_everything() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("blob");
        let mut src: &[u8] = b"0123456789";
        assert_eq!(DiskFs.write_stream(&mut src, &dest).unwrap(), 10);
        assert_eq!(DiskFs.read_file(&dest).unwrap(), b"0123456789");
    }

    #[test]
    fn missing_root_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = DiskFs.list_directories(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
    }
}
