//! Remote Writer.
//!
//! Thin pass-through to [`RemoteStore`] that stamps every object with the
//! property contract and the deterministic object name. The timestamp written
//! is the local world's `last_updated`, so the remote record reflects the
//! content it carries rather than the upload time.

use worldsync_core::{Backing, Placement, WorldFile};
use worldsync_remote::{RemoteStore, SyncRoot, WorldProperties};

use crate::error::SyncError;
use crate::remote_index::parse_record;

pub struct RemoteWriter<'a> {
    store: &'a dyn RemoteStore,
    root: &'a SyncRoot,
}

impl<'a> RemoteWriter<'a> {
    pub fn new(store: &'a dyn RemoteStore, root: &'a SyncRoot) -> Self {
        Self { store, root }
    }

    /// Create a new record for `local` with the given placement.
    pub fn create(
        &self,
        local: &WorldFile,
        placement: Placement,
        content: &[u8],
    ) -> Result<WorldFile, SyncError> {
        let props = WorldProperties::new(
            local.name.clone(),
            local.instance.clone(),
            placement,
            local.last_updated,
        );
        let name = props.object_name();
        let object = self
            .store
            .create(self.root, &name, &props.to_map(), content)?;
        tracing::info!("created remote {} ({} bytes)", name, content.len());
        parse_record(&object)
    }

    /// Replace the content of `remote` with `local`'s. On success `remote` is
    /// refreshed from the returned metadata; its identity does not change.
    pub fn update(
        &self,
        remote: &mut WorldFile,
        local: &WorldFile,
        content: &[u8],
    ) -> Result<(), SyncError> {
        let (id, placement) = match &remote.backing {
            Backing::Remote { id, placement } => (id.clone(), placement.clone()),
            Backing::Local { path } => {
                return Err(SyncError::Integrity {
                    id: path.display().to_string(),
                    reason: "cannot update a local record remotely".to_string(),
                })
            }
        };
        let props = WorldProperties::new(
            local.name.clone(),
            local.instance.clone(),
            placement,
            local.last_updated,
        );
        let object = self.store.update(&id, &props.to_map(), content)?;
        let refreshed = parse_record(&object)?;
        tracing::info!(
            "updated remote {} ({} bytes)",
            props.object_name(),
            content.len()
        );
        remote.last_updated = refreshed.last_updated;
        Ok(())
    }
}
