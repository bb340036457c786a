//! Local Index: one [`WorldFile`] per world directory of the saves root.
//!
//! Rebuilt from disk on every pass; nothing is cached between runs.

use std::path::Path;

use worldsync_core::{InstanceContext, WorldFile};

use crate::error::SyncError;
use crate::fs::{DirEntryInfo, WorldFs};
use crate::replace::ReplacePaths;

/// Enumerate the worlds of `ctx`. `last_updated` is the directory mtime.
///
/// Fails with a configuration error when the saves root is missing.
pub fn list_local(fs: &dyn WorldFs, ctx: &InstanceContext) -> Result<Vec<WorldFile>, SyncError> {
    let saves = ctx.require_saves_dir()?;
    let worlds: Vec<WorldFile> = fs
        .list_directories(saves)?
        .into_iter()
        .filter(|dir| !is_staging_leftover(fs, saves, dir))
        .map(|dir| WorldFile::local(dir.name, ctx.instance.clone(), dir.mod_time, dir.path))
        .collect();
    tracing::debug!("found {} local worlds in {}", worlds.len(), saves.display());
    Ok(worlds)
}

/// `<X>-new` left by an interrupted replace of `<X>`. The download archive
/// outlives the staging directory, so its presence tells the two apart from
/// a world that merely ends in `-new`.
fn is_staging_leftover(fs: &dyn WorldFs, saves: &Path, dir: &DirEntryInfo) -> bool {
    let Some(target) = dir.name.strip_suffix("-new") else {
        return false;
    };
    if target.is_empty() {
        return false;
    }
    let paths = ReplacePaths::for_world(&saves.join(target));
    if paths.staging != dir.path || !fs.exists(&paths.download) {
        return false;
    }
    tracing::warn!(
        "skipping {}: staging leftover of an interrupted replace of {}",
        dir.path.display(),
        target
    );
    true
}
