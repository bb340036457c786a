pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use worldsync_core::{host, InstanceContext, Settings, StoreKind};
use worldsync_remote::drive::{DriveStore, ENV_DRIVE_TOKEN};
use worldsync_remote::folder::FolderStore;
use worldsync_remote::RemoteStore;

/// Everything a command needs, resolved once per invocation.
pub struct Session {
    pub settings: Settings,
    pub ctx: InstanceContext,
    pub store: Box<dyn RemoteStore>,
}

impl Session {
    /// Resolve host, instance context and store from `settings` and the
    /// process environment.
    pub fn open(settings: Settings) -> Result<Self> {
        let host = host::resolve().context("could not determine this machine's host name")?;
        let ctx = InstanceContext::from_env(host)
            .context("could not resolve the launcher instance")?;
        let store = open_store(&settings)?;
        tracing::debug!(
            "instance {} on {}, saves at {}",
            ctx.instance,
            ctx.host,
            ctx.saves_dir.display()
        );
        Ok(Self {
            settings,
            ctx,
            store,
        })
    }
}

fn open_store(settings: &Settings) -> Result<Box<dyn RemoteStore>> {
    match &settings.store {
        StoreKind::Drive => {
            let token = settings.drive_token_path();
            let store = DriveStore::from_token_file(&token).with_context(|| {
                format!(
                    "no Drive credentials; write an access token to {} or set {}. \
                     Drive access tokens expire after about an hour, so supply a fresh one \
                     when this one stops working",
                    token.display(),
                    ENV_DRIVE_TOKEN
                )
            })?;
            Ok(Box::new(store))
        }
        StoreKind::Folder { path } => {
            tracing::debug!("using folder store at {}", path.display());
            Ok(Box::new(FolderStore::new(path)))
        }
    }
}

/// Local wall-clock rendering for tables; `-` when absent.
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(t) => t
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "-".to_string(),
    }
}
