mod common;

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use common::{
    archive_of, at, at_millis, dir_mtime, snapshot, write_world, BrokenReader, Fault, FaultyFs,
};
use worldsync_sync::replace::ReplacePaths;
use worldsync_sync::{create_world, replace_world, DiskFs, ReplaceStage, SyncError};

const OLD: &[(&str, &[u8])] = &[("level.dat", b"old level"), ("region/r.0.0.mca", b"old region")];
const NEW: &[(&str, &[u8])] = &[("level.dat", b"new level"), ("data/raids.dat", b"raids")];

fn assert_no_temporaries(world: &Path) {
    let paths = ReplacePaths::for_world(world);
    assert!(!paths.staging.exists(), "staging dir left behind");
    assert!(!paths.download.exists(), "download archive left behind");
    assert!(!paths.pending.exists(), "unverified backup left behind");
    assert!(!paths.rotated.exists(), "rotated backup left behind");
}

fn stage_of(err: &SyncError) -> Option<ReplaceStage> {
    match err {
        SyncError::Replace { stage, .. } => Some(*stage),
        _ => None,
    }
}

#[test]
fn update_swaps_content_and_stamps_mtime_exactly() {
    common::init_logging();
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let remote_ts = at_millis(200_123);

    let archive = archive_of(NEW);
    replace_world(&DiskFs, &world, &mut archive.as_slice(), remote_ts).unwrap();

    let expected = {
        let tmp2 = TempDir::new().unwrap();
        snapshot(&write_world(tmp2.path(), "x", NEW, at(0)))
    };
    assert_eq!(snapshot(&world), expected);
    assert_eq!(dir_mtime(&world), remote_ts);
    assert_no_temporaries(&world);

    // The backup holds the pre-update world.
    let paths = ReplacePaths::for_world(&world);
    let restored = tmp.path().join("restored");
    worldsync_sync::archive::unpack_into(fs::File::open(&paths.backup).unwrap(), &restored)
        .unwrap();
    assert_eq!(snapshot(&restored).len(), 2);
    assert_eq!(
        fs::read(restored.join("level.dat")).unwrap(),
        b"old level".to_vec()
    );
}

#[test]
fn update_supersedes_a_previous_backup() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);
    fs::write(&paths.backup, b"ancient backup").unwrap();

    let archive = archive_of(NEW);
    replace_world(&DiskFs, &world, &mut archive.as_slice(), at(300)).unwrap();

    assert_ne!(fs::read(&paths.backup).unwrap(), b"ancient backup".to_vec());
    assert_no_temporaries(&world);
}

#[test]
fn interrupted_download_leaves_world_untouched() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);
    fs::write(&paths.backup, b"previous backup").unwrap();
    let before = snapshot(&world);

    let archive = archive_of(NEW);
    let mut reader = BrokenReader::new(archive[..archive.len() / 2].to_vec());
    let err = replace_world(&DiskFs, &world, &mut reader, at(300)).unwrap_err();

    assert_eq!(stage_of(&err), Some(ReplaceStage::Downloading));
    assert_eq!(snapshot(&world), before);
    assert_eq!(dir_mtime(&world), at(100));
    assert_eq!(fs::read(&paths.backup).unwrap(), b"previous backup".to_vec());
    assert_no_temporaries(&world);
}

#[test]
fn failed_unpack_cleans_staging() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let before = snapshot(&world);
    let fs_ = FaultyFs::new();
    fs_.fail(Fault::Unpack);

    let archive = archive_of(NEW);
    let err = replace_world(&fs_, &world, &mut archive.as_slice(), at(300)).unwrap_err();

    assert!(matches!(
        stage_of(&err),
        Some(ReplaceStage::Downloading) | Some(ReplaceStage::Staged)
    ));
    assert_eq!(snapshot(&world), before);
    assert_no_temporaries(&world);
    // No previous backup existed, so none exists afterwards either.
    assert!(!ReplacePaths::for_world(&world).backup.exists());
}

#[test]
fn corrupt_download_is_rejected_before_swap() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let before = snapshot(&world);

    let garbage = b"<html>quota exceeded</html>".to_vec();
    let err = replace_world(&DiskFs, &world, &mut garbage.as_slice(), at(300)).unwrap_err();

    assert!(matches!(err, SyncError::Replace { .. }));
    assert_eq!(snapshot(&world), before);
    assert_no_temporaries(&world);
}

#[test]
fn failed_rename_during_swap_restores_world_and_backup_slot() {
    common::init_logging();
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);
    fs::write(&paths.backup, b"previous backup").unwrap();
    let before = snapshot(&world);

    let fs_ = FaultyFs::new();
    fs_.fail(Fault::RenameTree);
    let archive = archive_of(NEW);
    let err = replace_world(&fs_, &world, &mut archive.as_slice(), at(300)).unwrap_err();

    assert_eq!(stage_of(&err), Some(ReplaceStage::Swapping));
    assert!(world.is_dir(), "world must never be left absent");
    assert_eq!(snapshot(&world), before);
    assert_eq!(dir_mtime(&world), at(100));
    assert_eq!(fs::read(&paths.backup).unwrap(), b"previous backup".to_vec());
    assert_no_temporaries(&world);
}

#[test]
fn failed_mtime_stamp_still_restores_content() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let before = snapshot(&world);

    let fs_ = FaultyFs::new();
    fs_.fail(Fault::SetModTime);
    let archive = archive_of(NEW);
    let err = replace_world(&fs_, &world, &mut archive.as_slice(), at(300)).unwrap_err();

    // Restoring the old mtime fails too, after the content is back.
    assert!(matches!(err, SyncError::RollbackFailed { stage: ReplaceStage::Swapping, .. }));
    assert_eq!(snapshot(&world), before);
    assert_no_temporaries(&world);
    assert!(!ReplacePaths::for_world(&world).backup.exists());
}

#[test]
fn failed_mtime_restore_still_puts_previous_backup_back() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);
    fs::write(&paths.backup, b"previous backup").unwrap();
    let before = snapshot(&world);

    let fs_ = FaultyFs::new();
    fs_.fail(Fault::SetModTime);
    let archive = archive_of(NEW);
    let err = replace_world(&fs_, &world, &mut archive.as_slice(), at(300)).unwrap_err();

    assert!(matches!(err, SyncError::RollbackFailed { stage: ReplaceStage::Swapping, .. }));
    assert_eq!(snapshot(&world), before);
    assert_eq!(fs::read(&paths.backup).unwrap(), b"previous backup".to_vec());
    assert_no_temporaries(&world);
}

#[test]
fn failed_backup_restores_rotated_backup() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);
    fs::write(&paths.backup, b"previous backup").unwrap();
    let before = snapshot(&world);

    let fs_ = FaultyFs::new();
    fs_.fail(Fault::Pack);
    let archive = archive_of(NEW);
    let err = replace_world(&fs_, &world, &mut archive.as_slice(), at(300)).unwrap_err();

    assert_eq!(stage_of(&err), Some(ReplaceStage::BackingUp));
    assert_eq!(snapshot(&world), before);
    assert_eq!(fs::read(&paths.backup).unwrap(), b"previous backup".to_vec());
    assert_no_temporaries(&world);
}

#[test]
fn leftover_rotated_backup_survives_a_failed_backup() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);
    fs::write(&paths.rotated, b"intact backup").unwrap();
    fs::write(&paths.backup, b"partial backup").unwrap();

    let fs_ = FaultyFs::new();
    fs_.fail(Fault::Pack);
    let archive = archive_of(NEW);
    let err = replace_world(&fs_, &world, &mut archive.as_slice(), at(300)).unwrap_err();

    assert_eq!(stage_of(&err), Some(ReplaceStage::BackingUp));
    assert_eq!(fs::read(&paths.rotated).unwrap(), b"intact backup".to_vec());
    assert_eq!(fs::read(&paths.backup).unwrap(), b"partial backup".to_vec());
}

#[test]
fn leftover_rotated_backup_returns_to_the_backup_slot_on_rollback() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);
    fs::write(&paths.rotated, b"intact backup").unwrap();

    let archive = archive_of(NEW);
    let mut reader = BrokenReader::new(archive[..archive.len() / 2].to_vec());
    let err = replace_world(&DiskFs, &world, &mut reader, at(300)).unwrap_err();

    assert_eq!(stage_of(&err), Some(ReplaceStage::Downloading));
    assert_eq!(fs::read(&paths.backup).unwrap(), b"intact backup".to_vec());
    assert_no_temporaries(&world);
}

#[test]
fn verified_backup_supersedes_a_leftover_rotated_backup() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);
    fs::write(&paths.rotated, b"intact backup").unwrap();
    fs::write(&paths.backup, b"partial backup").unwrap();

    let archive = archive_of(NEW);
    replace_world(&DiskFs, &world, &mut archive.as_slice(), at(300)).unwrap();

    let restored = tmp.path().join("restored");
    worldsync_sync::archive::unpack_into(fs::File::open(&paths.backup).unwrap(), &restored)
        .unwrap();
    assert_eq!(
        fs::read(restored.join("level.dat")).unwrap(),
        b"old level".to_vec()
    );
    assert_no_temporaries(&world);
}

#[test]
fn failed_rollback_keeps_the_backup() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let paths = ReplacePaths::for_world(&world);

    let fs_ = FaultyFs::new();
    fs_.fail(Fault::RenameTree);
    // Staging unpack succeeds; restoring from the backup does not.
    fs_.fail_after(Fault::Unpack, 1);
    let archive = archive_of(NEW);
    let err = replace_world(&fs_, &world, &mut archive.as_slice(), at(300)).unwrap_err();

    assert!(matches!(err, SyncError::RollbackFailed { .. }));
    assert!(err.to_string().contains("rollback also failed"));
    assert!(paths.backup.exists(), "backup is the only copy left");
}

#[test]
fn create_materializes_a_new_world() {
    let tmp = TempDir::new().unwrap();
    let world = tmp.path().join("Fresh");
    let archive = archive_of(NEW);

    create_world(&DiskFs, &world, &mut archive.as_slice(), at(200)).unwrap();

    assert_eq!(snapshot(&world).len(), 2);
    assert_eq!(dir_mtime(&world), at(200));
    assert_no_temporaries(&world);
    assert!(!ReplacePaths::for_world(&world).backup.exists());
}

#[test]
fn failed_create_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let world = tmp.path().join("Fresh");
    let fs_ = FaultyFs::new();
    fs_.fail(Fault::Unpack);

    let archive = archive_of(NEW);
    let err = create_world(&fs_, &world, &mut archive.as_slice(), at(200)).unwrap_err();

    assert!(matches!(err, SyncError::Replace { .. }));
    assert!(!world.exists(), "partial world left behind");
    assert_no_temporaries(&world);
}

#[test]
fn create_refuses_to_overwrite_an_existing_world() {
    let tmp = TempDir::new().unwrap();
    let world = write_world(tmp.path(), "Base", OLD, at(100));
    let before = snapshot(&world);

    let archive = archive_of(NEW);
    let err = create_world(&DiskFs, &world, &mut archive.as_slice(), at(200)).unwrap_err();

    assert_eq!(stage_of(&err), Some(ReplaceStage::Idle));
    assert_eq!(snapshot(&world), before);
}
