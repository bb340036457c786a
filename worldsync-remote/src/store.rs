//! The remote collaborator seam.

use std::collections::BTreeMap;
use std::io::Read;

use worldsync_core::ObjectId;

use crate::error::RemoteError;
use crate::filter::SearchFilter;
use crate::object::{ObjectPage, RemoteObject, SyncRoot};

/// A blob store holding world archives plus a property bag per object.
///
/// Every call is blocking. Implementations must be shareable across the
/// worker threads of one pass.
pub trait RemoteStore: Send + Sync {
    /// Find the sync root folder by name, creating it when absent.
    /// Idempotent; fails when the name is ambiguous.
    fn resolve_sync_root(&self, name: &str) -> Result<SyncRoot, RemoteError>;

    /// One page of objects under `root` matching `filter`. `page_token` is
    /// the `next_page_token` of the previous page.
    fn list_page(
        &self,
        root: &SyncRoot,
        filter: &SearchFilter,
        page_token: Option<&str>,
    ) -> Result<ObjectPage, RemoteError>;

    fn create(
        &self,
        root: &SyncRoot,
        name: &str,
        properties: &BTreeMap<String, String>,
        content: &[u8],
    ) -> Result<RemoteObject, RemoteError>;

    /// Replace content and properties of an existing object. Identity is
    /// preserved.
    fn update(
        &self,
        id: &ObjectId,
        properties: &BTreeMap<String, String>,
        content: &[u8],
    ) -> Result<RemoteObject, RemoteError>;

    fn download(&self, id: &ObjectId) -> Result<Box<dyn Read + Send>, RemoteError>;
}
