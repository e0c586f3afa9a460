//! Nivelver sync coordinator
//!
//! Keeps user accounts consistent between the local store and the cloud
//! store under an offline-first policy:
//! - Dual writes: local first and authoritative, cloud second and advisory
//! - Pull, push and full reconciliation passes
//! - Last-write-wins conflict resolution by timestamp
//! - Optional periodic reconciliation through a scheduler

pub mod conflict;
pub mod coordinator;
pub mod report;
pub mod scheduler;

pub use conflict::{resolve, Resolution};
pub use coordinator::SyncCoordinator;
pub use report::{CloudWrite, FullSyncReport, PullReport, PushReport, SyncReport, WriteOutcome};
pub use scheduler::{SyncMode, SyncRequest, SyncScheduler, SyncSchedulerHandle};
