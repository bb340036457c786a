//! Reconciler.
//!
//! The decisions are pure functions over [`WorldFile`] records
//! ([`plan_upload`], [`plan_download`]); [`Reconciler`] executes them against
//! the store and the disk. A failure on one world is reported for that world
//! and never stops the others.

use worldsync_core::{HostName, InstanceContext, Placement, WorldFile};
use worldsync_remote::{RemoteStore, SyncRoot};

use crate::error::SyncError;
use crate::fs::WorldFs;
use crate::replace::{create_world, replace_world};
use crate::report::{MasterAction, WorldOutcome, WorldReport};
use crate::writer::RemoteWriter;

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyAction {
    Create,
    Update,
}

/// Decision for one local world in the upload direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPlan {
    /// This host's proxy is newer than the local world.
    SkipRemoteNewer,
    Upsert {
        proxy: ProxyAction,
        master: MasterAction,
    },
}

/// Decision for one remote master in the download direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPlan {
    SkipLocalNewer,
    /// Replace the existing local world.
    Replace,
    /// No local world yet.
    Create,
}

/// `proxy` must be this host's proxy for the same save, `master` the
/// instance's master for the same save.
pub fn plan_upload(
    local: &WorldFile,
    proxy: Option<&WorldFile>,
    master: Option<&WorldFile>,
) -> UploadPlan {
    if let Some(p) = proxy {
        if p.is_newer_than(local) {
            return UploadPlan::SkipRemoteNewer;
        }
    }
    let proxy = match proxy {
        Some(_) => ProxyAction::Update,
        None => ProxyAction::Create,
    };
    let master = match master {
        None => MasterAction::Created,
        Some(m) if local.is_newer_than(m) => MasterAction::Updated,
        Some(_) => MasterAction::Unchanged,
    };
    UploadPlan::Upsert { proxy, master }
}

pub fn plan_download(master: &WorldFile, local: Option<&WorldFile>) -> DownloadPlan {
    match local {
        Some(l) if !master.is_newer_than(l) => DownloadPlan::SkipLocalNewer,
        Some(_) => DownloadPlan::Replace,
        None => DownloadPlan::Create,
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Everything needed to act on one instance.
pub struct Reconciler<'a> {
    pub ctx: &'a InstanceContext,
    pub store: &'a dyn RemoteStore,
    pub root: &'a SyncRoot,
    pub fs: &'a dyn WorldFs,
}

impl<'a> Reconciler<'a> {
    fn host(&self) -> &HostName {
        &self.ctx.host
    }

    /// Upload one local world. Never fails; errors become
    /// [`WorldOutcome::Failed`].
    pub fn update_remote(
        &self,
        local: &WorldFile,
        proxy: Option<&WorldFile>,
        master: Option<&WorldFile>,
        dry_run: bool,
    ) -> WorldReport {
        match self.try_update_remote(local, proxy, master, dry_run) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("push {} failed: {}", local.name, e);
                WorldReport::failed(local.name.clone(), e)
            }
        }
    }

    fn try_update_remote(
        &self,
        local: &WorldFile,
        proxy: Option<&WorldFile>,
        master: Option<&WorldFile>,
        dry_run: bool,
    ) -> Result<WorldReport, SyncError> {
        let (proxy_action, master_action) = match plan_upload(local, proxy, master) {
            UploadPlan::SkipRemoteNewer => {
                tracing::info!(
                    "{}: remote proxy for {} is newer; skipping",
                    local.name,
                    self.host()
                );
                return Ok(WorldReport::new(
                    local.name.clone(),
                    WorldOutcome::SkippedRemoteNewer,
                ));
            }
            UploadPlan::Upsert { proxy, master } => (proxy, master),
        };
        let outcome = match proxy_action {
            ProxyAction::Create => WorldOutcome::Uploaded,
            ProxyAction::Update => WorldOutcome::Updated,
        };
        let report = WorldReport::new(local.name.clone(), outcome).with_master(master_action);
        if dry_run {
            tracing::info!(
                "[dry-run] {}: would {} proxy, master {}",
                local.name,
                report.outcome,
                master_action
            );
            return Ok(report);
        }

        let path = local.local_path().ok_or_else(|| SyncError::Integrity {
            id: local.name.to_string(),
            reason: "local record without a path".to_string(),
        })?;
        let content = self.fs.pack_directory(path)?;
        let writer = RemoteWriter::new(self.store, self.root);

        match proxy {
            Some(existing) => {
                let mut refreshed = existing.clone();
                writer.update(&mut refreshed, local, &content)?;
            }
            None => {
                writer.create(
                    local,
                    Placement::Proxy {
                        host: self.host().clone(),
                    },
                    &content,
                )?;
            }
        }

        let resulting_master = match (master_action, master) {
            (MasterAction::Updated, Some(existing)) => {
                let mut refreshed = existing.clone();
                writer.update(&mut refreshed, local, &content)?;
                refreshed
            }
            (MasterAction::Unchanged, Some(existing)) => existing.clone(),
            _ => writer.create(local, Placement::Master, &content)?,
        };

        // Align the local clock with what the remote side now considers
        // authoritative so the next pass does not see the world as newer.
        self.fs.set_mod_time(path, resulting_master.last_updated)?;
        tracing::info!(
            "{}: {} proxy, master {}",
            local.name,
            report.outcome,
            master_action
        );
        Ok(report)
    }

    /// Apply one remote master locally. Never fails; errors become
    /// [`WorldOutcome::Failed`].
    pub fn update_local(
        &self,
        master: &WorldFile,
        local: Option<&WorldFile>,
        dry_run: bool,
    ) -> WorldReport {
        match self.try_update_local(master, local, dry_run) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("pull {} failed: {}", master.name, e);
                WorldReport::failed(master.name.clone(), e)
            }
        }
    }

    fn try_update_local(
        &self,
        master: &WorldFile,
        local: Option<&WorldFile>,
        dry_run: bool,
    ) -> Result<WorldReport, SyncError> {
        let plan = plan_download(master, local);
        let outcome = match plan {
            DownloadPlan::SkipLocalNewer => {
                tracing::debug!("{}: local copy is current", master.name);
                return Ok(WorldReport::new(
                    master.name.clone(),
                    WorldOutcome::SkippedLocalNewer,
                ));
            }
            DownloadPlan::Replace => WorldOutcome::Downloaded,
            DownloadPlan::Create => WorldOutcome::Created,
        };
        if dry_run {
            tracing::info!("[dry-run] {}: would be {}", master.name, outcome);
            return Ok(WorldReport::new(master.name.clone(), outcome));
        }

        let id = master.remote_id().ok_or_else(|| SyncError::Integrity {
            id: master.name.to_string(),
            reason: "master record without an object id".to_string(),
        })?;
        let mut stream = self.store.download(id)?;

        match local.and_then(WorldFile::local_path) {
            Some(path) if plan == DownloadPlan::Replace => {
                replace_world(self.fs, path, &mut stream, master.last_updated)?;
            }
            _ => {
                let target = self.ctx.saves_dir.join(master.name.as_str());
                create_world(self.fs, &target, &mut stream, master.last_updated)?;
            }
        }
        tracing::info!("{}: {}", master.name, outcome);
        Ok(WorldReport::new(master.name.clone(), outcome))
    }
}
