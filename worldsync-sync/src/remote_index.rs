//! Remote Metadata Index.
//!
//! Runs a filtered search against the store, follows pagination to the end
//! and turns each object into a [`WorldFile`]. Objects whose property bag does
//! not identify a world are rejected and logged; they never reach the
//! reconciler.

use std::collections::HashSet;

use worldsync_core::WorldFile;
use worldsync_remote::{RemoteObject, RemoteStore, SearchFilter, SyncRoot, WorldProperties};

use crate::error::SyncError;

/// Search handle bound to one store and sync root.
pub struct RemoteIndex<'a> {
    store: &'a dyn RemoteStore,
    root: &'a SyncRoot,
}

impl<'a> RemoteIndex<'a> {
    pub fn new(store: &'a dyn RemoteStore, root: &'a SyncRoot) -> Self {
        Self { store, root }
    }

    /// Every valid record matching `filter`, in server order. An empty result
    /// is not an error.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<WorldFile>, SyncError> {
        let mut records = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.store.list_page(self.root, filter, token.as_deref())?;
            for object in &page.objects {
                match parse_record(object) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!("ignoring remote object '{}': {}", object.name, e),
                }
            }
            match page.next_page_token {
                Some(next) if seen_tokens.insert(next.clone()) => token = Some(next),
                Some(next) => {
                    tracing::warn!("store repeated page token '{}'; stopping search", next);
                    break;
                }
                None => break,
            }
        }

        tracing::debug!("remote search {:?} returned {} records", filter, records.len());
        Ok(records)
    }
}

/// Build a remote [`WorldFile`] from object metadata.
///
/// Fails with [`SyncError::Integrity`] when an identifying property is
/// missing or the save name cannot name a directory.
pub fn parse_record(object: &RemoteObject) -> Result<WorldFile, SyncError> {
    let props = WorldProperties::from_map(&object.app_properties)
        .map_err(|reason| SyncError::integrity(object.id.as_str(), reason))?;
    if !is_valid_save_name(props.save_name.as_str()) {
        return Err(SyncError::Integrity {
            id: object.id.0.clone(),
            reason: format!("save name '{}' is not a directory name", props.save_name),
        });
    }
    Ok(WorldFile::remote(
        props.save_name,
        props.instance,
        props.last_modified,
        object.id.clone(),
        props.placement,
    ))
}

/// A save name must be a single, plain path component.
pub fn is_valid_save_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
