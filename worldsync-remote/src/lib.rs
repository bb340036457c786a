//! # worldsync-remote
//!
//! The remote blob-store collaborator.
//!
//! [`RemoteStore`] is the seam the sync engine talks to. Three stores
//! implement it: [`drive::DriveStore`] (Google Drive v3),
//! [`folder::FolderStore`] (a plain directory, e.g. a shared or network
//! folder) and [`memory::MemoryStore`] (in-process).
//!
//! [`object`] defines the property contract every record carries so that any
//! tool can tell role, host and instance apart without ambiguity.

pub mod drive;
pub mod error;
pub mod filter;
pub mod folder;
pub mod memory;
pub mod object;
pub mod store;

pub use error::RemoteError;
pub use filter::SearchFilter;
pub use object::{ObjectPage, PropertyError, RemoteObject, SyncRoot, WorldProperties};
pub use store::RemoteStore;
