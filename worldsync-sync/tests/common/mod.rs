#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use worldsync_core::{HostName, InstanceContext, Placement, WorldFile};
use worldsync_remote::{RemoteStore, SyncRoot};
use worldsync_sync::fs::DirEntryInfo;
use worldsync_sync::writer::RemoteWriter;
use worldsync_sync::{DiskFs, SyncError, WorldFs};

pub const INSTANCE: &str = "1.19.2";
pub const ROOT: &str = "MinecraftSync";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn at_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).unwrap()
}

/// A game directory with an empty `saves/` and a context for `host`.
pub fn game(tmp: &TempDir, host: &str) -> InstanceContext {
    let game_dir = tmp.path().join(host).join(".minecraft");
    fs::create_dir_all(game_dir.join("saves")).unwrap();
    let vars = HashMap::from([
        ("INST_ID", INSTANCE.to_string()),
        ("INST_NAME", "Vanilla".to_string()),
        ("INST_DIR", tmp.path().join(host).display().to_string()),
        ("INST_MC_DIR", game_dir.display().to_string()),
    ]);
    InstanceContext::from_lookup(|k| vars.get(k).cloned(), HostName::from(host)).unwrap()
}

/// Write a world directory and set its mtime.
pub fn write_world(
    saves: &Path,
    name: &str,
    files: &[(&str, &[u8])],
    mtime: DateTime<Utc>,
) -> PathBuf {
    let dir = saves.join(name);
    fs::create_dir_all(&dir).unwrap();
    for (rel, content) in files {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    DiskFs.set_mod_time(&dir, mtime).unwrap();
    dir
}

/// Archive bytes for a tree made of `files`.
pub fn archive_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let tmp = TempDir::new().unwrap();
    let dir = write_world(tmp.path(), "w", files, at(0));
    DiskFs.pack_directory(&dir).unwrap()
}

/// Relative path -> file content for every file under `dir`.
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn visit(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                visit(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    visit(dir, dir, &mut out);
    out
}

pub fn dir_mtime(path: &Path) -> DateTime<Utc> {
    DiskFs.mod_time(path).unwrap()
}

/// Seed a master record for `name` holding `files`, stamped `ts`.
pub fn seed_master(
    store: &dyn RemoteStore,
    root: &SyncRoot,
    name: &str,
    files: &[(&str, &[u8])],
    ts: DateTime<Utc>,
) -> WorldFile {
    seed(store, root, name, files, ts, Placement::Master)
}

pub fn seed(
    store: &dyn RemoteStore,
    root: &SyncRoot,
    name: &str,
    files: &[(&str, &[u8])],
    ts: DateTime<Utc>,
    placement: Placement,
) -> WorldFile {
    let source = WorldFile::local(name, INSTANCE, ts, "/unused");
    RemoteWriter::new(store, root)
        .create(&source, placement, &archive_of(files))
        .unwrap()
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Pack,
    Unpack,
    WriteStream,
    WriteFile,
    RemoveTree,
    RenameTree,
    RenameFile,
    SetModTime,
}

/// [`DiskFs`] that fails chosen operations on demand.
#[derive(Default)]
pub struct FaultyFs {
    inner: DiskFs,
    /// Fault -> number of calls that still succeed before failing.
    faults: Mutex<HashMap<Fault, usize>>,
}

impl FaultyFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `fault`.
    pub fn fail(&self, fault: Fault) {
        self.fail_after(fault, 0);
    }

    /// Let `successes` calls through, then fail.
    pub fn fail_after(&self, fault: Fault, successes: usize) {
        self.faults.lock().unwrap().insert(fault, successes);
    }

    fn check(&self, fault: Fault, path: &Path) -> Result<(), SyncError> {
        let mut faults = self.faults.lock().unwrap();
        match faults.get_mut(&fault) {
            Some(0) => Err(SyncError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, format!("injected {fault:?}")),
            }),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl WorldFs for FaultyFs {
    fn list_directories(&self, root: &Path) -> Result<Vec<DirEntryInfo>, SyncError> {
        self.inner.list_directories(root)
    }

    fn pack_directory(&self, path: &Path) -> Result<Vec<u8>, SyncError> {
        self.check(Fault::Pack, path)?;
        self.inner.pack_directory(path)
    }

    fn unpack_archive(&self, archive: &Path, dest: &Path) -> Result<(), SyncError> {
        if let Err(e) = self.check(Fault::Unpack, dest) {
            // Leave a half-written tree behind, like a real mid-unpack failure.
            fs::create_dir_all(dest).unwrap();
            fs::write(dest.join("partial.mca"), b"half").unwrap();
            return Err(e);
        }
        self.inner.unpack_archive(archive, dest)
    }

    fn mod_time(&self, path: &Path) -> Result<DateTime<Utc>, SyncError> {
        self.inner.mod_time(path)
    }

    fn set_mod_time(&self, path: &Path, time: DateTime<Utc>) -> Result<(), SyncError> {
        self.check(Fault::SetModTime, path)?;
        self.inner.set_mod_time(path, time)
    }

    fn remove_tree(&self, path: &Path) -> Result<(), SyncError> {
        self.check(Fault::RemoveTree, path)?;
        self.inner.remove_tree(path)
    }

    fn rename_tree(&self, src: &Path, dst: &Path) -> Result<(), SyncError> {
        self.check(Fault::RenameTree, dst)?;
        self.inner.rename_tree(src, dst)
    }

    fn write_stream(&self, reader: &mut dyn Read, dest: &Path) -> Result<u64, SyncError> {
        self.check(Fault::WriteStream, dest)?;
        self.inner.write_stream(reader, dest)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
        self.check(Fault::WriteFile, path)?;
        self.inner.write_file(path, bytes)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, SyncError> {
        self.inner.read_file(path)
    }

    fn remove_file(&self, path: &Path) -> Result<(), SyncError> {
        self.inner.remove_file(path)
    }

    fn rename_file(&self, src: &Path, dst: &Path) -> Result<(), SyncError> {
        self.check(Fault::RenameFile, dst)?;
        self.inner.rename_file(src, dst)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }
}

/// Reader that yields `good` bytes and then fails, like a dropped connection.
pub struct BrokenReader {
    data: Vec<u8>,
    pos: usize,
}

impl BrokenReader {
    pub fn new(good: Vec<u8>) -> Self {
        Self { data: good, pos: 0 }
    }
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.data.len() {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
