//! One reconciliation pass.
//!
//! 1. Check the saves root and take the advisory lock.
//! 2. Resolve the sync root.
//! 3. Load the local index and the remote indexes concurrently.
//! 4. Refuse an inconsistent remote index before any side effect.
//! 5. Reconcile every world on a bounded pool of worker threads.

use std::collections::BTreeMap;
use std::sync::{mpsc, Mutex};
use std::thread;

use worldsync_core::{InstanceContext, Role, SaveName, WorldFile};
use worldsync_remote::{RemoteStore, SearchFilter, SyncRoot};

use crate::error::SyncError;
use crate::fs::WorldFs;
use crate::local_index::list_local;
use crate::lock::SavesLock;
use crate::reconcile::Reconciler;
use crate::remote_index::RemoteIndex;
use crate::report::{Direction, PassReport, WorldReport};

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOptions {
    pub direction: Direction,
    pub dry_run: bool,
    /// Upper bound on worlds processed at once.
    pub workers: usize,
    /// Name of the remote folder holding every record.
    pub root_name: String,
}

impl PassOptions {
    pub fn new(direction: Direction, root_name: impl Into<String>) -> Self {
        Self {
            direction,
            dry_run: false,
            workers: DEFAULT_WORKERS,
            root_name: root_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Indexes
// ---------------------------------------------------------------------------

/// The three record sets of one instance.
#[derive(Debug, Clone, Default)]
pub struct Indexes {
    pub local: Vec<WorldFile>,
    /// This host's proxies.
    pub proxies: Vec<WorldFile>,
    pub masters: Vec<WorldFile>,
}

impl Indexes {
    /// Load all three sets concurrently.
    pub fn load(
        ctx: &InstanceContext,
        store: &dyn RemoteStore,
        root: &SyncRoot,
        fs: &dyn WorldFs,
    ) -> Result<Self, SyncError> {
        let index = RemoteIndex::new(store, root);
        let proxy_filter = SearchFilter::proxies(&ctx.instance, &ctx.host);
        let master_filter = SearchFilter::masters(&ctx.instance);

        let (local, proxies, masters) = thread::scope(|s| {
            let local = s.spawn(|| list_local(fs, ctx));
            let proxies = s.spawn(|| index.search(&proxy_filter));
            let masters = index.search(&master_filter);
            (join(local), join(proxies), masters)
        });

        let indexes = Self {
            local: local?,
            proxies: proxies?,
            masters: masters?,
        };
        tracing::info!(
            "{} local worlds, {} proxies for {}, {} masters",
            indexes.local.len(),
            indexes.proxies.len(),
            ctx.host,
            indexes.masters.len()
        );
        Ok(indexes)
    }

    /// At most one master per save, and one proxy per save for this host.
    pub fn check_consistency(&self, ctx: &InstanceContext) -> Result<(), SyncError> {
        check_unique(&self.masters, ctx, Role::Master)?;
        check_unique(&self.proxies, ctx, Role::Proxy)
    }

    pub fn proxy_for(&self, local: &WorldFile) -> Option<&WorldFile> {
        self.proxies.iter().find(|p| p.is_same_save(local))
    }

    pub fn master_for(&self, world: &WorldFile) -> Option<&WorldFile> {
        self.masters.iter().find(|m| m.is_same_save(world))
    }

    pub fn local_for(&self, world: &WorldFile) -> Option<&WorldFile> {
        self.local.iter().find(|l| l.is_same_save(world))
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn check_unique(
    records: &[WorldFile],
    ctx: &InstanceContext,
    role: Role,
) -> Result<(), SyncError> {
    let mut counts: BTreeMap<&SaveName, usize> = BTreeMap::new();
    for record in records.iter().filter(|r| r.instance == ctx.instance) {
        *counts.entry(&record.name).or_default() += 1;
    }
    match counts.into_iter().find(|(_, n)| *n > 1) {
        Some((save, count)) => Err(SyncError::AmbiguousIndex {
            instance: ctx.instance.to_string(),
            save: save.to_string(),
            role,
            count,
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

/// Run one pass in `options.direction`.
///
/// Fatal errors (configuration, lock, sync root, index loading, inconsistent
/// index) abort before any world is touched. Per-world failures are reported
/// in the returned [`PassReport`].
pub fn run_pass(
    ctx: &InstanceContext,
    store: &dyn RemoteStore,
    fs: &dyn WorldFs,
    options: &PassOptions,
) -> Result<PassReport, SyncError> {
    let saves = ctx.require_saves_dir()?;
    let _lock = if options.dry_run {
        None
    } else {
        Some(SavesLock::acquire(saves)?)
    };

    tracing::info!(
        "{} pass for instance {} on {}{}",
        options.direction,
        ctx.instance,
        ctx.host,
        if options.dry_run { " (dry run)" } else { "" }
    );

    let root = store.resolve_sync_root(&options.root_name)?;
    let indexes = Indexes::load(ctx, store, &root, fs)?;
    indexes.check_consistency(ctx)?;

    let reconciler = Reconciler {
        ctx,
        store,
        root: &root,
        fs,
    };
    let dry_run = options.dry_run;

    let mut worlds = match options.direction {
        Direction::Push => run_bounded(options.workers, indexes.local.iter().collect(), |local| {
            reconciler.update_remote(
                local,
                indexes.proxy_for(local),
                indexes.master_for(local),
                dry_run,
            )
        }),
        Direction::Pull => run_bounded(options.workers, indexes.masters.iter().collect(), |master| {
            reconciler.update_local(master, indexes.local_for(master), dry_run)
        }),
    };
    worlds.sort_by(|a: &WorldReport, b: &WorldReport| a.world.cmp(&b.world));

    let report = PassReport {
        direction: options.direction,
        instance: ctx.instance.clone(),
        host: ctx.host.clone(),
        dry_run,
        worlds,
    };
    if report.has_failures() {
        tracing::warn!(
            "{} pass finished with {} failed worlds",
            options.direction,
            report.failures()
        );
    } else {
        tracing::info!("{} pass finished: {} worlds", options.direction, report.worlds.len());
    }
    Ok(report)
}

/// Apply `job` to every item on at most `workers` scoped threads.
/// Result order is completion order.
pub fn run_bounded<J, R, F>(workers: usize, items: Vec<J>, job: F) -> Vec<R>
where
    J: Send,
    R: Send,
    F: Fn(J) -> R + Sync,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let (job_tx, job_rx) = mpsc::channel::<J>();
    for item in items {
        // The receiver lives until the end of this function.
        let _ = job_tx.send(item);
    }
    drop(job_tx);

    let job_rx = Mutex::new(job_rx);
    let (result_tx, result_rx) = mpsc::channel::<R>();
    let threads = workers.clamp(1, total);

    thread::scope(|s| {
        for _ in 0..threads {
            let result_tx = result_tx.clone();
            let job_rx = &job_rx;
            let job = &job;
            s.spawn(move || loop {
                let next = job_rx.lock().unwrap_or_else(|p| p.into_inner()).recv();
                match next {
                    Ok(item) => {
                        if result_tx.send(job(item)).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            });
        }
    });
    drop(result_tx);
    result_rx.into_iter().collect()
}
