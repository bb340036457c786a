//! In-process store with fault injection. Backs the engine's unit tests.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::Mutex;

use chrono::Utc;

use worldsync_core::ObjectId;

use crate::error::RemoteError;
use crate::filter::SearchFilter;
use crate::object::{ObjectPage, RemoteObject, SyncRoot};
use crate::store::RemoteStore;

#[derive(Debug, Clone)]
struct Entry {
    parent: ObjectId,
    object: RemoteObject,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    roots: BTreeMap<String, ObjectId>,
    /// Insertion order is listing order.
    entries: Vec<Entry>,
    next_id: u64,
    writes: usize,
    downloads: usize,
    fail_downloads: HashSet<ObjectId>,
    fail_writes: bool,
}

impl State {
    fn fresh_id(&mut self, prefix: &str) -> ObjectId {
        self.next_id += 1;
        ObjectId::from(format!("{prefix}{}", self.next_id))
    }
}

/// Thread-safe in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 100,
        }
    }

    /// Small pages exercise pagination.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked; the data is
        // still usable.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Store a record verbatim, bypassing the property contract.
    pub fn insert_raw(
        &self,
        root: &SyncRoot,
        name: &str,
        properties: BTreeMap<String, String>,
        content: Vec<u8>,
    ) -> ObjectId {
        let mut state = self.lock();
        let id = state.fresh_id("obj-");
        state.entries.push(Entry {
            parent: root.id.clone(),
            object: RemoteObject {
                id: id.clone(),
                name: name.to_string(),
                modified_time: Some(Utc::now()),
                app_properties: properties,
            },
            content,
        });
        id
    }

    /// Every object, in insertion order.
    pub fn objects(&self) -> Vec<RemoteObject> {
        self.lock().entries.iter().map(|e| e.object.clone()).collect()
    }

    pub fn content(&self, id: &ObjectId) -> Option<Vec<u8>> {
        self.lock()
            .entries
            .iter()
            .find(|e| &e.object.id == id)
            .map(|e| e.content.clone())
    }

    /// Number of successful create + update calls.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Number of successful download calls.
    pub fn download_count(&self) -> usize {
        self.lock().downloads
    }

    /// Make `download(id)` fail.
    pub fn fail_download(&self, id: &ObjectId) {
        self.lock().fail_downloads.insert(id.clone());
    }

    /// Make every create and update fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

impl RemoteStore for MemoryStore {
    fn resolve_sync_root(&self, name: &str) -> Result<SyncRoot, RemoteError> {
        let mut state = self.lock();
        let id = match state.roots.get(name) {
            Some(id) => id.clone(),
            None => {
                let id = state.fresh_id("root-");
                state.roots.insert(name.to_string(), id.clone());
                id
            }
        };
        Ok(SyncRoot {
            id,
            name: name.to_string(),
        })
    }

    fn list_page(
        &self,
        root: &SyncRoot,
        filter: &SearchFilter,
        page_token: Option<&str>,
    ) -> Result<ObjectPage, RemoteError> {
        let state = self.lock();
        let matching: Vec<&Entry> = state
            .entries
            .iter()
            .filter(|e| e.parent == root.id && filter.matches(&e.object.app_properties))
            .collect();
        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| RemoteError::InvalidName {
                name: token.to_string(),
                reason: "not a page token of this store",
            })?,
            None => 0,
        };
        let end = (offset + self.page_size).min(matching.len());
        let objects = matching
            .iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .map(|e| e.object.clone())
            .collect();
        Ok(ObjectPage {
            objects,
            next_page_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    fn create(
        &self,
        root: &SyncRoot,
        name: &str,
        properties: &BTreeMap<String, String>,
        content: &[u8],
    ) -> Result<RemoteObject, RemoteError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(RemoteError::Injected { op: "create" });
        }
        let id = state.fresh_id("obj-");
        let object = RemoteObject {
            id,
            name: name.to_string(),
            modified_time: Some(Utc::now()),
            app_properties: properties.clone(),
        };
        state.entries.push(Entry {
            parent: root.id.clone(),
            object: object.clone(),
            content: content.to_vec(),
        });
        state.writes += 1;
        Ok(object)
    }

    fn update(
        &self,
        id: &ObjectId,
        properties: &BTreeMap<String, String>,
        content: &[u8],
    ) -> Result<RemoteObject, RemoteError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(RemoteError::Injected { op: "update" });
        }
        let entry = state
            .entries
            .iter_mut()
            .find(|e| &e.object.id == id)
            .ok_or_else(|| RemoteError::NotFound { id: id.0.clone() })?;
        entry.object.app_properties = properties.clone();
        entry.object.modified_time = Some(Utc::now());
        entry.content = content.to_vec();
        let object = entry.object.clone();
        state.writes += 1;
        Ok(object)
    }

    fn download(&self, id: &ObjectId) -> Result<Box<dyn Read + Send>, RemoteError> {
        let mut state = self.lock();
        if state.fail_downloads.contains(id) {
            return Err(RemoteError::Injected { op: "download" });
        }
        let content = state
            .entries
            .iter()
            .find(|e| &e.object.id == id)
            .map(|e| e.content.clone())
            .ok_or_else(|| RemoteError::NotFound { id: id.0.clone() })?;
        state.downloads += 1;
        Ok(Box::new(Cursor::new(content)))
    }
}
