//! worldsync core library: world records, instance context, settings, errors.
//!
//! Public API surface:
//! - [`types`]: identifiers and the [`WorldFile`] record
//! - [`context`]: the launcher instance a pass runs against
//! - [`settings`]: `<home>/config.yaml` + environment overrides
//! - [`host`]: machine identifier used for proxy records
//! - [`error`]: [`ConfigError`]

pub mod context;
pub mod error;
pub mod host;
pub mod settings;
pub mod types;

pub use context::InstanceContext;
pub use error::ConfigError;
pub use settings::{Settings, StoreKind};
pub use types::{
    Backing, HostName, InstanceId, ObjectId, Placement, Role, SaveName, Source, WorldFile,
    TIMESTAMP_LEEWAY_MS,
};
