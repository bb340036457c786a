//! Directory-backed store.
//!
//! Turns any directory (a network share, a synced folder, a USB stick) into a
//! remote store:
//!
//! ```text
//! <base>/
//!   <root name>/
//!     <stem>.json     RemoteObject metadata
//!     <stem>.blob     archive payload
//! ```
//!
//! Object ids are `<root name>/<stem>`. Writes go to a temporary file that is
//! renamed into place, so a reader never observes a half-written record.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use tracing::{debug, warn};

use worldsync_core::ObjectId;

use crate::error::{io_err, RemoteError};
use crate::filter::SearchFilter;
use crate::object::{ObjectPage, RemoteObject, SyncRoot};
use crate::store::RemoteStore;

pub const DEFAULT_PAGE_SIZE: usize = 100;

pub struct FolderStore {
    base: PathBuf,
    page_size: usize,
    counter: AtomicU64,
}

impl FolderStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            page_size: DEFAULT_PAGE_SIZE,
            counter: AtomicU64::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn root_dir(&self, root: &SyncRoot) -> PathBuf {
        self.base.join(root.id.as_str())
    }

    fn new_stem(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{:x}-{:x}-{:x}", nanos, std::process::id(), n)
    }

    /// Split an id into the (metadata, blob) paths it denotes.
    fn paths_for(&self, id: &ObjectId) -> Result<(PathBuf, PathBuf), RemoteError> {
        let raw = id.as_str();
        let invalid = |reason| RemoteError::InvalidName {
            name: raw.to_string(),
            reason,
        };
        let (root, stem) = raw.split_once('/').ok_or_else(|| invalid("expected <root>/<stem>"))?;
        if root.is_empty() || stem.is_empty() || stem.contains('/') {
            return Err(invalid("expected <root>/<stem>"));
        }
        if raw.contains("..") || raw.contains('\\') {
            return Err(invalid("path traversal"));
        }
        let dir = self.base.join(root);
        Ok((
            dir.join(format!("{stem}.json")),
            dir.join(format!("{stem}.blob")),
        ))
    }

    fn read_meta(&self, path: &Path) -> Result<RemoteObject, RemoteError> {
        let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_json::from_str(&raw).map_err(|source| RemoteError::Json {
            op: "read metadata",
            source,
        })
    }

    fn write_record(
        &self,
        meta_path: &Path,
        blob_path: &Path,
        object: &RemoteObject,
        content: &[u8],
    ) -> Result<(), RemoteError> {
        write_atomic(blob_path, content)?;
        let json = serde_json::to_vec_pretty(object).map_err(|source| RemoteError::Json {
            op: "write metadata",
            source,
        })?;
        write_atomic(meta_path, &json)
    }
}

impl RemoteStore for FolderStore {
    fn resolve_sync_root(&self, name: &str) -> Result<SyncRoot, RemoteError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(RemoteError::InvalidName {
                name: name.to_string(),
                reason: "root name must be a single path component",
            });
        }
        let dir = self.base.join(name);
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            debug!("created folder store root {}", dir.display());
        }
        Ok(SyncRoot {
            id: ObjectId::from(name),
            name: name.to_string(),
        })
    }

    fn list_page(
        &self,
        root: &SyncRoot,
        filter: &SearchFilter,
        page_token: Option<&str>,
    ) -> Result<ObjectPage, RemoteError> {
        let dir = self.root_dir(root);
        let entries = std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;

        let mut meta_paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                meta_paths.push(path);
            }
        }
        meta_paths.sort();

        let mut matching = Vec::new();
        for path in meta_paths {
            match self.read_meta(&path) {
                Ok(object) if filter.matches(&object.app_properties) => matching.push(object),
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable record {}: {}", path.display(), e),
            }
        }

        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| RemoteError::InvalidName {
                name: token.to_string(),
                reason: "not a page token of this store",
            })?,
            None => 0,
        };
        let end = (offset + self.page_size).min(matching.len());
        let objects = matching.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < matching.len()).then(|| end.to_string());
        Ok(ObjectPage {
            objects,
            next_page_token,
        })
    }

    fn create(
        &self,
        root: &SyncRoot,
        name: &str,
        properties: &BTreeMap<String, String>,
        content: &[u8],
    ) -> Result<RemoteObject, RemoteError> {
        let id = ObjectId::from(format!("{}/{}", root.id, self.new_stem()));
        let (meta_path, blob_path) = self.paths_for(&id)?;
        let object = RemoteObject {
            id,
            name: name.to_string(),
            modified_time: Some(Utc::now()),
            app_properties: properties.clone(),
        };
        self.write_record(&meta_path, &blob_path, &object, content)?;
        Ok(object)
    }

    fn update(
        &self,
        id: &ObjectId,
        properties: &BTreeMap<String, String>,
        content: &[u8],
    ) -> Result<RemoteObject, RemoteError> {
        let (meta_path, blob_path) = self.paths_for(id)?;
        if !meta_path.exists() {
            return Err(RemoteError::NotFound { id: id.0.clone() });
        }
        let mut object = self.read_meta(&meta_path)?;
        object.app_properties = properties.clone();
        object.modified_time = Some(Utc::now());
        self.write_record(&meta_path, &blob_path, &object, content)?;
        Ok(object)
    }

    fn download(&self, id: &ObjectId) -> Result<Box<dyn Read + Send>, RemoteError> {
        let (_, blob_path) = self.paths_for(id)?;
        match std::fs::File::open(&blob_path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RemoteError::NotFound { id: id.0.clone() })
            }
            Err(e) => Err(io_err(&blob_path, e)),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RemoteError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        io_err(path, e)
    })
}
