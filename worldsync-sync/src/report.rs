//! Per-world outcomes of a pass.

use std::fmt;

use serde::Serialize;

use worldsync_core::{HostName, InstanceId, SaveName};

/// What happened to one world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum WorldOutcome {
    /// This host's remote proxy is newer than the local world.
    SkippedRemoteNewer,
    /// The local world is as new as the master or newer.
    SkippedLocalNewer,
    /// A proxy record was created for this host.
    Uploaded,
    /// This host's existing proxy record was updated.
    Updated,
    /// An existing local world was replaced by the master.
    Downloaded,
    /// A new local world was created from the master.
    Created,
    Failed { reason: String },
}

impl WorldOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, WorldOutcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorldOutcome::SkippedRemoteNewer => "skipped-remote-newer",
            WorldOutcome::SkippedLocalNewer => "skipped-local-newer",
            WorldOutcome::Uploaded => "uploaded",
            WorldOutcome::Updated => "updated",
            WorldOutcome::Downloaded => "downloaded",
            WorldOutcome::Created => "created",
            WorldOutcome::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for WorldOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// What happened to the master record during an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterAction {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for MasterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterAction::Created => f.write_str("created"),
            MasterAction::Updated => f.write_str("updated"),
            MasterAction::Unchanged => f.write_str("unchanged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldReport {
    pub world: SaveName,
    #[serde(flatten)]
    pub outcome: WorldOutcome,
    /// Upload direction only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<MasterAction>,
}

impl WorldReport {
    pub fn new(world: SaveName, outcome: WorldOutcome) -> Self {
        Self {
            world,
            outcome,
            master: None,
        }
    }

    pub fn with_master(mut self, master: MasterAction) -> Self {
        self.master = Some(master);
        self
    }

    pub fn failed(world: SaveName, reason: impl fmt::Display) -> Self {
        Self::new(
            world,
            WorldOutcome::Failed {
                reason: reason.to_string(),
            },
        )
    }
}

/// Direction of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local state to remote proxies and masters.
    Push,
    /// Remote masters to local.
    Pull,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Push => f.write_str("push"),
            Direction::Pull => f.write_str("pull"),
        }
    }
}

/// Result of one pass; worlds sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub direction: Direction,
    pub instance: InstanceId,
    pub host: HostName,
    pub dry_run: bool,
    pub worlds: Vec<WorldReport>,
}

impl PassReport {
    pub fn failures(&self) -> usize {
        self.worlds.iter().filter(|w| w.outcome.is_failure()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }

    /// Count of worlds per outcome label, in a stable order.
    pub fn summary(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for report in &self.worlds {
            let label = report.outcome.label();
            match counts.iter_mut().find(|(l, _)| *l == label) {
                Some((_, n)) => *n += 1,
                None => counts.push((label, 1)),
            }
        }
        counts.sort_by(|a, b| a.0.cmp(b.0));
        counts
    }
}
