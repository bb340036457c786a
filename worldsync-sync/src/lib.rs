//! # worldsync-sync
//!
//! Reconciliation engine and atomic local replace.
//!
//! Call [`run_pass`] to push local worlds to the remote store or pull remote
//! masters to the local saves root, or [`status::world_status`] to see what
//! either direction would do.

pub mod archive;
pub mod error;
pub mod fs;
pub mod local_index;
pub mod lock;
pub mod pipeline;
pub mod reconcile;
pub mod remote_index;
pub mod replace;
pub mod report;
pub mod status;
pub mod writer;

pub use error::SyncError;
pub use fs::{DiskFs, WorldFs};
pub use pipeline::{run_pass, PassOptions};
pub use reconcile::{plan_download, plan_upload, Reconciler};
pub use replace::{create_world, replace_world, ReplaceStage};
pub use report::{Direction, MasterAction, PassReport, WorldOutcome, WorldReport};
