//! Remote object metadata and the property contract.
//!
//! Every record carries an application property bag:
//!
//! | key              | value                                   |
//! |------------------|-----------------------------------------|
//! | `mcSaveName`     | save (world directory) name             |
//! | `mcInstance`     | instance id                             |
//! | `mcType`         | `proxy` or `master`                     |
//! | `mcHost`         | originating host (proxy only)           |
//! | `mcLastModified` | content timestamp, RFC 3339 millis, UTC |
//! | `mcVersion`      | schema version ([`SCHEMA_VERSION`])     |
//!
//! Object names are derived deterministically so that records never collide
//! across instances or hosts: `{instance}-{save}-master` and
//! `{instance}-{save}-proxy:{host}`.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use worldsync_core::{HostName, InstanceId, ObjectId, Placement, Role, SaveName};

pub const PROP_SAVE_NAME: &str = "mcSaveName";
pub const PROP_INSTANCE: &str = "mcInstance";
pub const PROP_ROLE: &str = "mcType";
pub const PROP_HOST: &str = "mcHost";
pub const PROP_LAST_MODIFIED: &str = "mcLastModified";
pub const PROP_VERSION: &str = "mcVersion";

/// Current property schema. Records older than this carry no usable identity.
pub const SCHEMA_VERSION: u32 = 2;

/// Content type of uploaded world archives.
pub const ARCHIVE_MIME: &str = "application/gzip";

/// Metadata of one remote object, as returned by search/create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub id: ObjectId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub app_properties: BTreeMap<String, String>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<RemoteObject>,
    pub next_page_token: Option<String>,
}

/// Handle to the folder holding every record. Returned by
/// [`crate::RemoteStore::resolve_sync_root`] and passed explicitly to every
/// call that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoot {
    pub id: ObjectId,
    pub name: String,
}

/// Why a property bag does not describe a world record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("missing property {0}")]
    Missing(&'static str),
    #[error("property {key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("schema version {found} predates {SCHEMA_VERSION}; no migration exists")]
    Outdated { found: u32 },
}

/// Typed view of the property bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldProperties {
    pub save_name: SaveName,
    pub instance: InstanceId,
    pub placement: Placement,
    pub last_modified: DateTime<Utc>,
}

impl WorldProperties {
    pub fn new(
        save_name: SaveName,
        instance: InstanceId,
        placement: Placement,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            save_name,
            instance,
            placement,
            last_modified: truncate_to_millis(last_modified),
        }
    }

    /// Deterministic object name.
    pub fn object_name(&self) -> String {
        let suffix = match &self.placement {
            Placement::Master => "master".to_string(),
            Placement::Proxy { host } => format!("proxy:{host}"),
        };
        format!("{}-{}-{}", self.instance, self.save_name, suffix)
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(PROP_SAVE_NAME.to_string(), self.save_name.0.clone());
        map.insert(PROP_INSTANCE.to_string(), self.instance.0.clone());
        map.insert(PROP_ROLE.to_string(), self.placement.role().to_string());
        if let Placement::Proxy { host } = &self.placement {
            map.insert(PROP_HOST.to_string(), host.0.clone());
        }
        map.insert(
            PROP_LAST_MODIFIED.to_string(),
            format_timestamp(self.last_modified),
        );
        map.insert(PROP_VERSION.to_string(), SCHEMA_VERSION.to_string());
        map
    }

    /// Parse a property bag. Every identifying field must be present.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, PropertyError> {
        let get = |key: &'static str| -> Result<&str, PropertyError> {
            map.get(key)
                .map(String::as_str)
                .filter(|v| !v.trim().is_empty())
                .ok_or(PropertyError::Missing(key))
        };

        let raw_version = get(PROP_VERSION)?;
        let version = raw_version
            .trim()
            .parse::<u32>()
            .map_err(|_| PropertyError::Invalid {
                key: PROP_VERSION,
                value: raw_version.to_string(),
            })?;
        if version < SCHEMA_VERSION {
            return Err(PropertyError::Outdated { found: version });
        }

        let save_name = SaveName::from(get(PROP_SAVE_NAME)?);
        let instance = InstanceId::from(get(PROP_INSTANCE)?);
        let raw_role = get(PROP_ROLE)?;
        let role = raw_role
            .parse::<Role>()
            .map_err(|_| PropertyError::Invalid {
                key: PROP_ROLE,
                value: raw_role.to_string(),
            })?;
        let placement = match role {
            Role::Master => Placement::Master,
            Role::Proxy => Placement::Proxy {
                host: HostName::from(get(PROP_HOST)?),
            },
        };
        let raw_ts = get(PROP_LAST_MODIFIED)?;
        let last_modified = parse_timestamp(raw_ts).ok_or(PropertyError::Invalid {
            key: PROP_LAST_MODIFIED,
            value: raw_ts.to_string(),
        })?;

        Ok(Self {
            save_name,
            instance,
            placement,
            last_modified,
        })
    }
}

/// RFC 3339 with millisecond precision, `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Drop sub-millisecond precision so the stored value round-trips exactly.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
