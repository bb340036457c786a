//! Error types for worldsync-remote.

use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to a remote store. All of them are transient from the
/// engine's point of view: they fail the world being processed, not the pass.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request never produced an HTTP response.
    #[error("{op}: transport failure: {message}")]
    Transport { op: &'static str, message: String },

    /// The store answered with a non-success status.
    #[error("{op}: store returned HTTP {code}: {body}")]
    Status {
        op: &'static str,
        code: u16,
        body: String,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Response or metadata (de)serialization failure.
    #[error("{op}: JSON error: {source}")]
    Json {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The object id does not exist in the store.
    #[error("remote object {id} not found")]
    NotFound { id: String },

    /// More than one sync root folder carries the configured name.
    #[error("found {count} remote folders named '{name}'; expected at most one")]
    AmbiguousRoot { name: String, count: usize },

    /// A name or id cannot be used by this store.
    #[error("invalid remote name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The store has no credentials to act with.
    #[error("no credentials for remote store: {0}")]
    Unauthenticated(String),

    /// Injected failure (in-process store only).
    #[error("{op}: injected failure")]
    Injected { op: &'static str },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.into(),
        source,
    }
}
