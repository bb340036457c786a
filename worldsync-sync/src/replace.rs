//! Atomic Local Replace.
//!
//! Swaps a world directory `D` for downloaded content without ever leaving
//! the world absent or half-written. For `D` in saves root `S`:
//!
//! ```text
//! S/D                 the world
//! S/D-new             staging directory the download is unpacked into
//! S/D.old.tar.gz      backup of D taken before anything destructive
//! S/D.old.tar.gz.part new backup, until its digest is verified
//! S/D.tmp.tar.gz      previous backup, set aside once the new one is verified
//! S/D.new.tar.gz      downloaded archive
//! ```
//!
//! Update runs `Idle → BackingUp → Downloading → Staged → Swapping → Done`.
//! An existing backup or a leftover `D.tmp.tar.gz` is only removed after the
//! new backup passed its digest check. Every failure goes through
//! [`Procedure::rollback`], which inspects the stage that failed:
//!
//! * `BackingUp`, `Downloading`, `Staged`: `D` was never touched. Staging
//!   artifacts are removed and the previous backup is put back.
//! * `Swapping`: `D` may be gone. It is rebuilt from the backup taken in
//!   `BackingUp` before the previous backup is put back.
//!
//! Only rebuilding `D` can stop a rollback. Every other rollback step still
//! runs when an earlier one failed, and the first such failure is reported.
//!
//! Create (no existing `D`) downloads and unpacks straight into `D`; any
//! failure removes the partial `D` and the download.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::archive::digest;
use crate::error::{io_err, SyncError};
use crate::fs::WorldFs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStage {
    Idle,
    BackingUp,
    Downloading,
    Staged,
    Swapping,
    Done,
}

impl fmt::Display for ReplaceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplaceStage::Idle => "idle",
            ReplaceStage::BackingUp => "backing up",
            ReplaceStage::Downloading => "downloading",
            ReplaceStage::Staged => "staged",
            ReplaceStage::Swapping => "swapping",
            ReplaceStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Sibling paths used while replacing one world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacePaths {
    pub world: PathBuf,
    pub staging: PathBuf,
    pub backup: PathBuf,
    pub pending: PathBuf,
    pub rotated: PathBuf,
    pub download: PathBuf,
}

impl ReplacePaths {
    pub fn for_world(world: &Path) -> Self {
        let name = world
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sibling = |suffix: &str| world.with_file_name(format!("{name}{suffix}"));
        Self {
            world: world.to_path_buf(),
            staging: sibling("-new"),
            backup: sibling(".old.tar.gz"),
            pending: sibling(".old.tar.gz.part"),
            rotated: sibling(".tmp.tar.gz"),
            download: sibling(".new.tar.gz"),
        }
    }
}

/// Replace the existing world at `world` with the archive read from
/// `content`, then set its mtime to `mod_time`.
pub fn replace_world(
    fs: &dyn WorldFs,
    world: &Path,
    content: &mut dyn Read,
    mod_time: DateTime<Utc>,
) -> Result<(), SyncError> {
    let mut procedure = Procedure::new(fs, world, mod_time);
    let outcome = procedure.update(content);
    procedure.finish(outcome)
}

/// Materialize a new world at `world` from the archive read from `content`.
pub fn create_world(
    fs: &dyn WorldFs,
    world: &Path,
    content: &mut dyn Read,
    mod_time: DateTime<Utc>,
) -> Result<(), SyncError> {
    let mut procedure = Procedure::new(fs, world, mod_time);
    let outcome = procedure.create(content);
    procedure.finish(outcome)
}

struct Procedure<'a> {
    fs: &'a dyn WorldFs,
    paths: ReplacePaths,
    mod_time: DateTime<Utc>,
    stage: ReplaceStage,
    creating: bool,
    /// `paths.backup` holds the verified backup taken by this attempt.
    fresh_backup: bool,
    /// mtime of `D` before the attempt, restored on rollback.
    original_mod_time: Option<DateTime<Utc>>,
}

impl<'a> Procedure<'a> {
    fn new(fs: &'a dyn WorldFs, world: &Path, mod_time: DateTime<Utc>) -> Self {
        Self {
            fs,
            paths: ReplacePaths::for_world(world),
            mod_time,
            stage: ReplaceStage::Idle,
            creating: false,
            fresh_backup: false,
            original_mod_time: None,
        }
    }

    fn world_name(&self) -> String {
        self.paths
            .world
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn advance(&mut self, next: ReplaceStage) {
        tracing::debug!("{}: {} -> {}", self.world_name(), self.stage, next);
        self.stage = next;
    }

    fn update(&mut self, content: &mut dyn Read) -> Result<(), SyncError> {
        let fs = self.fs;
        let paths = self.paths.clone();
        self.clear_leftovers()?;
        self.original_mod_time = Some(fs.mod_time(&paths.world)?);

        self.advance(ReplaceStage::BackingUp);
        let packed = fs.pack_directory(&paths.world)?;
        fs.write_file(&paths.pending, &packed)?;
        let expected = digest(&packed);
        let actual = digest(&fs.read_file(&paths.pending)?);
        if expected != actual {
            return Err(SyncError::BackupMismatch {
                path: paths.pending.clone(),
                expected,
                actual,
            });
        }
        if fs.exists(&paths.backup) {
            if fs.exists(&paths.rotated) {
                fs.remove_file(&paths.rotated)?;
            }
            fs.rename_file(&paths.backup, &paths.rotated)?;
        }
        fs.rename_file(&paths.pending, &paths.backup)?;
        self.fresh_backup = true;

        self.advance(ReplaceStage::Downloading);
        let bytes = fs.write_stream(content, &paths.download)?;
        tracing::debug!("downloaded {} bytes to {}", bytes, paths.download.display());

        fs.unpack_archive(&paths.download, &paths.staging)?;
        self.advance(ReplaceStage::Staged);

        self.advance(ReplaceStage::Swapping);
        fs.remove_tree(&paths.world)?;
        fs.rename_tree(&paths.staging, &paths.world)?;
        fs.set_mod_time(&paths.world, self.mod_time)?;

        self.advance(ReplaceStage::Done);
        self.discard(&paths.download);
        if fs.exists(&paths.rotated) {
            self.discard(&paths.rotated);
        }
        Ok(())
    }

    fn create(&mut self, content: &mut dyn Read) -> Result<(), SyncError> {
        let fs = self.fs;
        let paths = self.paths.clone();
        self.creating = true;
        if fs.exists(&paths.world) {
            return Err(io_err(
                &paths.world,
                std::io::Error::new(ErrorKind::AlreadyExists, "world already exists"),
            ));
        }
        self.clear_leftovers()?;

        self.advance(ReplaceStage::Downloading);
        fs.write_stream(content, &paths.download)?;

        self.advance(ReplaceStage::Staged);
        fs.unpack_archive(&paths.download, &paths.world)?;
        fs.set_mod_time(&paths.world, self.mod_time)?;

        self.advance(ReplaceStage::Done);
        self.discard(&paths.download);
        Ok(())
    }

    /// Staging artifacts from an interrupted earlier attempt.
    fn clear_leftovers(&self) -> Result<(), SyncError> {
        if self.fs.exists(&self.paths.staging) {
            self.fs.remove_tree(&self.paths.staging)?;
        }
        if self.fs.exists(&self.paths.download) {
            self.fs.remove_file(&self.paths.download)?;
        }
        if self.fs.exists(&self.paths.pending) {
            self.fs.remove_file(&self.paths.pending)?;
        }
        Ok(())
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = self.fs.remove_file(path) {
            tracing::warn!("could not remove {}: {}", path.display(), e);
        }
    }

    fn finish(mut self, outcome: Result<(), SyncError>) -> Result<(), SyncError> {
        let cause = match outcome {
            Ok(()) => return Ok(()),
            Err(cause) => cause,
        };
        let stage = self.stage;
        let world = self.world_name();
        tracing::warn!("{}: failed while {}: {}; rolling back", world, stage, cause);
        match self.rollback() {
            Ok(()) => Err(SyncError::Replace {
                world,
                stage,
                source: Box::new(cause),
            }),
            Err(rollback) => {
                tracing::error!("{}: rollback failed: {}", world, rollback);
                Err(SyncError::RollbackFailed {
                    world,
                    stage,
                    cause: Box::new(cause),
                    rollback: Box::new(rollback),
                })
            }
        }
    }

    /// Bring the disk back to its state before the attempt.
    fn rollback(&mut self) -> Result<(), SyncError> {
        let fs = self.fs;
        let paths = self.paths.clone();
        let mut failures = Vec::new();

        if self.creating {
            if self.stage == ReplaceStage::Staged {
                attempt(&mut failures, remove_tree_if_exists(fs, &paths.world));
            }
            attempt(&mut failures, remove_file_if_exists(fs, &paths.download));
            self.stage = ReplaceStage::Idle;
            return first_failure(&self.world_name(), failures);
        }

        let mut world_intact = true;
        if self.stage == ReplaceStage::Swapping {
            match self.restore_world() {
                Ok(()) => {
                    if let Some(original) = self.original_mod_time {
                        attempt(&mut failures, fs.set_mod_time(&paths.world, original));
                    }
                }
                Err(e) => {
                    world_intact = false;
                    failures.push(e);
                }
            }
        }

        attempt(&mut failures, remove_tree_if_exists(fs, &paths.staging));
        attempt(&mut failures, remove_file_if_exists(fs, &paths.download));
        attempt(&mut failures, remove_file_if_exists(fs, &paths.pending));

        // The fresh backup is the last good copy of D until D is rebuilt.
        if world_intact {
            if self.fresh_backup {
                attempt(&mut failures, remove_file_if_exists(fs, &paths.backup));
                self.fresh_backup = false;
            }
            if !fs.exists(&paths.backup) && fs.exists(&paths.rotated) {
                attempt(&mut failures, fs.rename_file(&paths.rotated, &paths.backup));
            }
        }
        self.stage = ReplaceStage::Idle;
        first_failure(&self.world_name(), failures)
    }

    /// Rebuild `D` from the backup taken by this attempt.
    fn restore_world(&self) -> Result<(), SyncError> {
        let paths = &self.paths;
        remove_tree_if_exists(self.fs, &paths.world)?;
        self.fs.unpack_archive(&paths.backup, &paths.world)?;
        tracing::info!("{}: restored from {}", self.world_name(), paths.backup.display());
        Ok(())
    }
}

fn attempt(failures: &mut Vec<SyncError>, step: Result<(), SyncError>) {
    if let Err(e) = step {
        failures.push(e);
    }
}

fn first_failure(world: &str, failures: Vec<SyncError>) -> Result<(), SyncError> {
    let mut failures = failures.into_iter();
    let Some(first) = failures.next() else {
        return Ok(());
    };
    for other in failures {
        tracing::warn!("{}: rollback step failed: {}", world, other);
    }
    Err(first)
}

fn remove_tree_if_exists(fs: &dyn WorldFs, path: &Path) -> Result<(), SyncError> {
    if fs.exists(path) {
        fs.remove_tree(path)?;
    }
    Ok(())
}

fn remove_file_if_exists(fs: &dyn WorldFs, path: &Path) -> Result<(), SyncError> {
    if fs.exists(path) {
        fs.remove_file(path)?;
    }
    Ok(())
}
