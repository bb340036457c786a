//! Google Drive v3 store.
//!
//! Talks to the REST API directly with `ureq`. OAuth is not handled here: a
//! bearer access token is taken from `WORLDSYNC_DRIVE_TOKEN` or from the token
//! file under the worldsync home. Such tokens expire after about an hour and
//! are never refreshed; a fresh one has to be supplied for each session.
//!
//! Records live as children of one sync root folder. Content is uploaded with
//! `uploadType=multipart` so metadata and archive travel in one request.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use worldsync_core::ObjectId;

use crate::error::{io_err, RemoteError};
use crate::filter::{escape_query, SearchFilter};
use crate::object::{ObjectPage, RemoteObject, SyncRoot, ARCHIVE_MIME};
use crate::store::RemoteStore;

pub const ENV_DRIVE_TOKEN: &str = "WORLDSYNC_DRIVE_TOKEN";

pub const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
pub const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const OBJECT_FIELDS: &str = "id, name, appProperties, modifiedTime";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, appProperties, modifiedTime)";
const PAGE_SIZE: &str = "100";

/// Appended to every missing or rejected token error.
pub const TOKEN_EXPIRY_HINT: &str =
    "Drive access tokens expire after about an hour; supply a fresh one";

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteObject>,
    next_page_token: Option<String>,
}

pub struct DriveStore {
    agent: ureq::Agent,
    token: String,
    files_url: String,
    upload_url: String,
}

impl DriveStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_endpoints(token, FILES_URL, UPLOAD_URL)
    }

    /// Point the store at different endpoints (proxies, emulators).
    pub fn with_endpoints(
        token: impl Into<String>,
        files_url: impl Into<String>,
        upload_url: impl Into<String>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(15))
            .timeout_read(Duration::from_secs(300))
            .build();
        Self {
            agent,
            token: token.into(),
            files_url: files_url.into(),
            upload_url: upload_url.into(),
        }
    }

    /// Build a store from the environment token or `token_file`.
    pub fn from_token_file(token_file: &Path) -> Result<Self, RemoteError> {
        Ok(Self::new(load_token(token_file)?))
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn list_files(
        &self,
        op: &'static str,
        q: &str,
        fields: &str,
        page_token: Option<&str>,
    ) -> Result<FileList, RemoteError> {
        let mut request = self
            .agent
            .get(&self.files_url)
            .set("Authorization", &self.auth())
            .query("q", q)
            .query("fields", fields)
            .query("pageSize", PAGE_SIZE)
            .query("spaces", "drive");
        if let Some(token) = page_token {
            request = request.query("pageToken", token);
        }
        let response = request.call().map_err(|e| map_ureq(op, e))?;
        read_json(op, response)
    }

    fn create_folder(&self, name: &str) -> Result<RemoteObject, RemoteError> {
        let response = self
            .agent
            .post(&self.files_url)
            .set("Authorization", &self.auth())
            .query("fields", "id, name")
            .send_json(json!({ "name": name, "mimeType": FOLDER_MIME }))
            .map_err(|e| map_ureq("create folder", e))?;
        read_json("create folder", response)
    }
}

impl RemoteStore for DriveStore {
    fn resolve_sync_root(&self, name: &str) -> Result<SyncRoot, RemoteError> {
        let q = format!(
            "mimeType = '{FOLDER_MIME}' and name = '{}' and trashed = false",
            escape_query(name)
        );
        let mut found = self.list_files("find sync root", &q, "files(id, name)", None)?;
        match found.files.len() {
            0 => {
                let folder = self.create_folder(name)?;
                info!("created remote sync folder '{}' ({})", name, folder.id);
                Ok(SyncRoot {
                    id: folder.id,
                    name: name.to_string(),
                })
            }
            1 => {
                let id = found.files.swap_remove(0).id;
                debug!("using remote sync folder '{}' ({})", name, id);
                Ok(SyncRoot {
                    id,
                    name: name.to_string(),
                })
            }
            count => Err(RemoteError::AmbiguousRoot {
                name: name.to_string(),
                count,
            }),
        }
    }

    fn list_page(
        &self,
        root: &SyncRoot,
        filter: &SearchFilter,
        page_token: Option<&str>,
    ) -> Result<ObjectPage, RemoteError> {
        let q = filter.drive_query(root.id.as_str());
        let list = self.list_files("search", &q, LIST_FIELDS, page_token)?;
        Ok(ObjectPage {
            objects: list.files,
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    fn create(
        &self,
        root: &SyncRoot,
        name: &str,
        properties: &BTreeMap<String, String>,
        content: &[u8],
    ) -> Result<RemoteObject, RemoteError> {
        let metadata = json!({
            "name": name,
            "parents": [root.id.as_str()],
            "mimeType": ARCHIVE_MIME,
            "appProperties": properties,
        });
        let multipart = Multipart::new(&metadata, content);
        let response = self
            .agent
            .post(&self.upload_url)
            .set("Authorization", &self.auth())
            .set("Content-Type", &multipart.content_type())
            .query("uploadType", "multipart")
            .query("fields", OBJECT_FIELDS)
            .send_bytes(&multipart.body)
            .map_err(|e| map_ureq("create", e))?;
        read_json("create", response)
    }

    fn update(
        &self,
        id: &ObjectId,
        properties: &BTreeMap<String, String>,
        content: &[u8],
    ) -> Result<RemoteObject, RemoteError> {
        let metadata = json!({
            "mimeType": ARCHIVE_MIME,
            "appProperties": properties,
        });
        let multipart = Multipart::new(&metadata, content);
        let url = format!("{}/{}", self.upload_url, id);
        let response = self
            .agent
            .request("PATCH", &url)
            .set("Authorization", &self.auth())
            .set("Content-Type", &multipart.content_type())
            .query("uploadType", "multipart")
            .query("fields", OBJECT_FIELDS)
            .send_bytes(&multipart.body)
            .map_err(|e| map_ureq("update", e))?;
        read_json("update", response)
    }

    fn download(&self, id: &ObjectId) -> Result<Box<dyn Read + Send>, RemoteError> {
        let url = format!("{}/{}", self.files_url, id);
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &self.auth())
            .query("alt", "media")
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(404, _) => RemoteError::NotFound { id: id.0.clone() },
                other => map_ureq("download", other),
            })?;
        Ok(Box::new(response.into_reader()))
    }
}

/// Token from `WORLDSYNC_DRIVE_TOKEN`, else the first line of `path`.
pub fn load_token(path: &Path) -> Result<String, RemoteError> {
    if let Some(token) = std::env::var(ENV_DRIVE_TOKEN)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
    {
        return Ok(token);
    }
    if !path.exists() {
        return Err(RemoteError::Unauthenticated(format!(
            "set {ENV_DRIVE_TOKEN} or write an access token to {} ({TOKEN_EXPIRY_HINT})",
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            RemoteError::Unauthenticated(format!(
                "{} is empty ({TOKEN_EXPIRY_HINT})",
                path.display()
            ))
        })
}

/// A `multipart/related` upload body with a boundary found in neither part.
struct Multipart {
    boundary: String,
    body: Vec<u8>,
}

impl Multipart {
    fn new(metadata: &serde_json::Value, content: &[u8]) -> Self {
        let metadata = metadata.to_string();
        let boundary = pick_boundary(&[metadata.as_bytes(), content], next_boundary);
        let mut body = Vec::with_capacity(content.len() + metadata.len() + 256);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata.as_bytes());
        body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {ARCHIVE_MIME}\r\n\r\n").as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Self { boundary, body }
    }

    fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }
}

fn next_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("worldsync-{nanos:x}-{seq:x}")
}

/// First candidate that occurs in none of `parts`.
fn pick_boundary(parts: &[&[u8]], mut candidate: impl FnMut() -> String) -> String {
    loop {
        let boundary = candidate();
        let needle = boundary.as_bytes();
        let clashes = parts
            .iter()
            .any(|part| part.windows(needle.len()).any(|w| w == needle));
        if !clashes {
            return boundary;
        }
        debug!("multipart boundary {boundary} occurs in the payload, picking another");
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    op: &'static str,
    response: ureq::Response,
) -> Result<T, RemoteError> {
    let mut raw = String::new();
    response
        .into_reader()
        .read_to_string(&mut raw)
        .map_err(|e| RemoteError::Transport {
            op,
            message: e.to_string(),
        })?;
    serde_json::from_str(&raw).map_err(|source| RemoteError::Json { op, source })
}

fn map_ureq(op: &'static str, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            if code == 401 {
                return RemoteError::Unauthenticated(format!(
                    "{op}: HTTP 401: {body} ({TOKEN_EXPIRY_HINT})"
                ));
            }
            RemoteError::Status { op, code, body }
        }
        ureq::Error::Transport(transport) => RemoteError::Transport {
            op,
            message: transport.to_string(),
        },
    }
}
