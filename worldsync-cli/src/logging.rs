//! Subscriber setup and log file rotation.
//!
//! Records from the library crates arrive through the `log` bridge. Everything
//! goes to stderr and is appended to `<home>/logs/worldsync.log`. The log file
//! is rotated before it is opened once it exceeds 10 MiB, keeping 5 copies:
//!   worldsync.log → worldsync.log.1 → … → worldsync.log.5

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use worldsync_core::Settings;

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated copies to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(settings: &Settings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.log_level)
            .with_context(|| format!("invalid log level '{}'", settings.log_level))?,
    };

    let log_path = settings.log_file();
    let file_layer = match open_log_file(&log_path, settings.clear_log_on_start) {
        Ok(file) => Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        ),
        Err(err) => {
            eprintln!("warning: not logging to {}: {err}", log_path.display());
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .try_init()
        .context("failed to install log subscriber")
}

/// Rotate or truncate, then open `path` for appending.
fn open_log_file(path: &Path, truncate: bool) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    if truncate {
        return OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path);
    }
    rotate_if_needed(path, MAX_LOG_BYTES, MAX_ROTATED_FILES)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// Rotate `log_path` if its size reaches `max_bytes`.
///
/// Returns `true` if rotation occurred. A missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// `worldsync.log` → `worldsync.log.<n>`
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("worldsync.log");
    base.with_file_name(format!("{name}.{n}"))
}
