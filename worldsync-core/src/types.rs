//! Domain types for world records.
//!
//! A [`WorldFile`] describes one world artifact regardless of where it lives.
//! The local and remote forms share one struct; the [`Backing`] variant
//! carries the source-specific handle and consumers branch on it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Two timestamps closer than this are treated as equal.
///
/// Applied identically by [`WorldFile::is_newer_than`] in both directions.
pub const TIMESTAMP_LEEWAY_MS: i64 = 1_000;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Logical save name, stable within an instance (the world directory name).
    SaveName
);
string_newtype!(
    /// Launcher instance identifier.
    InstanceId
);
string_newtype!(
    /// Machine identifier attached to proxy records.
    HostName
);
string_newtype!(
    /// Opaque remote object id.
    ObjectId
);

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Role of a remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Proxy,
    Master,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Proxy => write!(f, "proxy"),
            Role::Master => write!(f, "master"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proxy" => Ok(Role::Proxy),
            "master" => Ok(Role::Master),
            other => Err(format!("unknown role '{other}'; expected proxy or master")),
        }
    }
}

/// Where a record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Local,
    Remote,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local => write!(f, "local"),
            Source::Remote => write!(f, "remote"),
        }
    }
}

/// Role-specific payload of a remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Snapshot owned by one (instance, host) pair.
    Proxy { host: HostName },
    /// Canonical snapshot of the instance, host independent.
    Master,
}

impl Placement {
    pub fn role(&self) -> Role {
        match self {
            Placement::Proxy { .. } => Role::Proxy,
            Placement::Master => Role::Master,
        }
    }
}

/// Handle to the underlying artifact. Owned by the index that produced the
/// record; the reconciler only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    Local { path: PathBuf },
    Remote { id: ObjectId, placement: Placement },
}

// ---------------------------------------------------------------------------
// WorldFile
// ---------------------------------------------------------------------------

/// One world artifact, local or remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldFile {
    pub name: SaveName,
    pub instance: InstanceId,
    pub last_updated: DateTime<Utc>,
    pub backing: Backing,
}

impl WorldFile {
    pub fn local(
        name: impl Into<SaveName>,
        instance: impl Into<InstanceId>,
        last_updated: DateTime<Utc>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            instance: instance.into(),
            last_updated,
            backing: Backing::Local { path: path.into() },
        }
    }

    pub fn remote(
        name: impl Into<SaveName>,
        instance: impl Into<InstanceId>,
        last_updated: DateTime<Utc>,
        id: impl Into<ObjectId>,
        placement: Placement,
    ) -> Self {
        Self {
            name: name.into(),
            instance: instance.into(),
            last_updated,
            backing: Backing::Remote {
                id: id.into(),
                placement,
            },
        }
    }

    pub fn source(&self) -> Source {
        match self.backing {
            Backing::Local { .. } => Source::Local,
            Backing::Remote { .. } => Source::Remote,
        }
    }

    /// `None` for local records.
    pub fn role(&self) -> Option<Role> {
        match &self.backing {
            Backing::Local { .. } => None,
            Backing::Remote { placement, .. } => Some(placement.role()),
        }
    }

    /// Originating host, proxies only.
    pub fn host(&self) -> Option<&HostName> {
        match &self.backing {
            Backing::Remote {
                placement: Placement::Proxy { host },
                ..
            } => Some(host),
            _ => None,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Local { path } => Some(path),
            Backing::Remote { .. } => None,
        }
    }

    pub fn remote_id(&self) -> Option<&ObjectId> {
        match &self.backing {
            Backing::Remote { id, .. } => Some(id),
            Backing::Local { .. } => None,
        }
    }

    /// Identity is name + instance; role and host do not participate.
    pub fn is_same_save(&self, other: &WorldFile) -> bool {
        self.name == other.name && self.instance == other.instance
    }

    /// Strictly newer than `other` by more than [`TIMESTAMP_LEEWAY_MS`].
    pub fn is_newer_than(&self, other: &WorldFile) -> bool {
        newer_beyond_leeway(self.last_updated, other.last_updated)
    }
}

impl fmt::Display for WorldFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{}",
            self.instance,
            self.name,
            self.source()
        )?;
        match &self.backing {
            Backing::Local { .. } => {}
            Backing::Remote {
                placement: Placement::Master,
                ..
            } => write!(f, " master")?,
            Backing::Remote {
                placement: Placement::Proxy { host },
                ..
            } => write!(f, " proxy:{host}")?,
        }
        write!(f, "] {}", self.last_updated.to_rfc3339())
    }
}

/// `a − b > leeway`.
pub fn newer_beyond_leeway(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.signed_duration_since(b) > Duration::milliseconds(TIMESTAMP_LEEWAY_MS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
