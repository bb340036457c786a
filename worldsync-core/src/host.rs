//! Machine identifier used to tag proxy records.
//!
//! Resolution order: `WORLDSYNC_HOST`, then `COMPUTERNAME` on Windows, then the
//! pretty host name from `hostnamectl` on Linux, then the system host name.

use std::process::Command;

use crate::error::ConfigError;
use crate::types::HostName;

pub const ENV_HOST_OVERRIDE: &str = "WORLDSYNC_HOST";

/// Resolve the host name for this machine.
pub fn resolve() -> Result<HostName, ConfigError> {
    if let Some(name) = non_empty(std::env::var(ENV_HOST_OVERRIDE).ok()) {
        return Ok(HostName::from(name));
    }

    if cfg!(windows) {
        return non_empty(std::env::var("COMPUTERNAME").ok())
            .map(HostName::from)
            .ok_or(ConfigError::HostUnresolved);
    }

    if cfg!(target_os = "linux") {
        if let Some(pretty) = non_empty(pretty_hostname()) {
            return Ok(HostName::from(pretty));
        }
    }

    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .and_then(|h| non_empty(Some(h)))
        .map(HostName::from)
        .ok_or(ConfigError::HostUnresolved)
}

fn pretty_hostname() -> Option<String> {
    let output = Command::new("hostnamectl").arg("--pretty").output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
