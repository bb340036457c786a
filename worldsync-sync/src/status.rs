//! Read-only view of where every world stands.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use worldsync_core::{InstanceContext, SaveName};
use worldsync_remote::RemoteStore;

use crate::error::SyncError;
use crate::fs::WorldFs;
use crate::pipeline::Indexes;
use crate::reconcile::{plan_download, plan_upload, DownloadPlan, ProxyAction, UploadPlan};
use crate::report::MasterAction;

/// One row per save known locally or remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldStatus {
    pub world: SaveName,
    pub local: Option<DateTime<Utc>>,
    pub proxy: Option<DateTime<Utc>>,
    pub master: Option<DateTime<Utc>>,
    /// What `push` would do; `None` when there is no local world.
    pub push: Option<String>,
    /// What `pull` would do; `None` when there is no master.
    pub pull: Option<String>,
}

/// Load the indexes and evaluate both plans for every save without acting.
pub fn world_status(
    ctx: &InstanceContext,
    store: &dyn RemoteStore,
    fs: &dyn WorldFs,
    root_name: &str,
) -> Result<Vec<WorldStatus>, SyncError> {
    ctx.require_saves_dir()?;
    let root = store.resolve_sync_root(root_name)?;
    let indexes = Indexes::load(ctx, store, &root, fs)?;
    indexes.check_consistency(ctx)?;
    Ok(summarize(&indexes))
}

pub fn summarize(indexes: &Indexes) -> Vec<WorldStatus> {
    let mut rows: BTreeMap<SaveName, WorldStatus> = BTreeMap::new();

    for local in &indexes.local {
        let plan = plan_upload(local, indexes.proxy_for(local), indexes.master_for(local));
        let entry = row(&mut rows, &local.name);
        entry.local = Some(local.last_updated);
        entry.push = Some(describe_upload(plan));
    }
    for proxy in &indexes.proxies {
        row(&mut rows, &proxy.name).proxy = Some(proxy.last_updated);
    }
    for master in &indexes.masters {
        let plan = plan_download(master, indexes.local_for(master));
        let entry = row(&mut rows, &master.name);
        entry.master = Some(master.last_updated);
        entry.pull = Some(describe_download(plan));
    }
    rows.into_values().collect()
}

fn row<'m>(rows: &'m mut BTreeMap<SaveName, WorldStatus>, name: &SaveName) -> &'m mut WorldStatus {
    rows.entry(name.clone()).or_insert_with(|| WorldStatus {
        world: name.clone(),
        local: None,
        proxy: None,
        master: None,
        push: None,
        pull: None,
    })
}

fn describe_upload(plan: UploadPlan) -> String {
    match plan {
        UploadPlan::SkipRemoteNewer => "skip (remote newer)".to_string(),
        UploadPlan::Upsert { proxy, master } => {
            let proxy = match proxy {
                ProxyAction::Create => "create proxy",
                ProxyAction::Update => "update proxy",
            };
            let master = match master {
                MasterAction::Created => ", create master",
                MasterAction::Updated => ", update master",
                MasterAction::Unchanged => "",
            };
            format!("{proxy}{master}")
        }
    }
}

fn describe_download(plan: DownloadPlan) -> String {
    match plan {
        DownloadPlan::SkipLocalNewer => "skip (local current)",
        DownloadPlan::Replace => "replace local",
        DownloadPlan::Create => "create local",
    }
    .to_string()
}
