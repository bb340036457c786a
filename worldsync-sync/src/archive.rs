//! World archive codec.
//!
//! A world travels as a gzip-compressed tarball of its directory contents.
//! Packing is deterministic: entries are walked in sorted order and carry no
//! owner or timestamp, so packing an unchanged tree twice yields identical
//! bytes. Unpacking goes through `tar`'s sanitizing `unpack`, which refuses
//! entries that would land outside the destination.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tar::{EntryType, Header};

use crate::error::{archive_err, SyncError};

/// Pack the contents of `root` (not `root` itself) into a `.tar.gz`.
pub fn pack_directory(root: &Path) -> Result<Vec<u8>, SyncError> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    for entry in walkdir::WalkDir::new(root).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            archive_err(path, e.into())
        })?;
        let path = entry.path();
        if path == root {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .map_err(|e| archive_err(path, std::io::Error::new(ErrorKind::Other, e)))?;
        let file_type = entry.file_type();

        let mut header = Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        if file_type.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder
                .append_data(&mut header, rel, std::io::empty())
                .map_err(|e| archive_err(path, e))?;
        } else if file_type.is_file() {
            let metadata = entry.metadata().map_err(|e| archive_err(path, e.into()))?;
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(metadata.len());
            let file = File::open(path).map_err(|e| archive_err(path, e))?;
            builder
                .append_data(&mut header, rel, file)
                .map_err(|e| archive_err(path, e))?;
        } else {
            tracing::debug!("not archiving special file {}", path.display());
        }
    }

    let tar_bytes = builder.into_inner().map_err(|e| archive_err(root, e))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&tar_bytes)
        .map_err(|e| archive_err(root, e))?;
    encoder.finish().map_err(|e| archive_err(root, e))
}

/// Unpack a `.tar.gz` stream into `dest`, creating it if needed.
pub fn unpack_into(archive: impl Read, dest: &Path) -> Result<(), SyncError> {
    std::fs::create_dir_all(dest).map_err(|e| archive_err(dest, e))?;
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    tar.set_preserve_mtime(false);
    tar.set_overwrite(true);
    tar.unpack(dest).map_err(|e| archive_err(dest, e))
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}
