//! Outcomes of dual writes and reconciliation passes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to the advisory cloud half of a dual write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CloudWrite {
    /// The cloud accepted the write.
    Synced,
    /// The cloud write failed; the next push reconciles it.
    Deferred { reason: String },
}

impl CloudWrite {
    pub fn is_synced(&self) -> bool {
        matches!(self, CloudWrite::Synced)
    }
}

/// Result of a dual write that succeeded locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome<T> {
    /// Value produced by the local write.
    pub value: T,
    /// Informational status of the cloud write.
    pub cloud: CloudWrite,
}

/// Counters from a pull pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    /// False when the remote collection could not be fetched.
    pub cloud_reachable: bool,
    /// Remote records that decoded successfully.
    pub fetched: usize,
    /// Records created locally from the remote copy.
    pub created: usize,
    /// Local records overwritten by a strictly newer remote copy.
    pub updated: usize,
    /// Records left as they were.
    pub unchanged: usize,
}

impl PullReport {
    /// Report for a pass that could not reach the cloud.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Number of local mutations performed.
    pub fn mutations(&self) -> usize {
        self.created + self.updated
    }
}

impl fmt::Display for PullReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.cloud_reachable {
            return write!(f, "cloud unavailable, local data kept");
        }
        write!(
            f,
            "{} fetched, {} created, {} updated, {} unchanged",
            self.fetched, self.created, self.updated, self.unchanged
        )
    }
}

/// Counters from a push pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} success, {} failed", self.succeeded, self.failed)
    }
}

/// Pull followed by push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullSyncReport {
    pub pull: PullReport,
    pub push: PushReport,
}

impl fmt::Display for FullSyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pull: {}; push: {}", self.pull, self.push)
    }
}

/// Result of any reconciliation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncReport {
    Pull(PullReport),
    Push(PushReport),
    Full(FullSyncReport),
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncReport::Pull(report) => write!(f, "pull: {}", report),
            SyncReport::Push(report) => write!(f, "push: {}", report),
            SyncReport::Full(report) => report.fmt(f),
        }
    }
}
