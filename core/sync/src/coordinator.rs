//! Sync coordinator: dual writes and reconciliation between the two stores.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use nivelver_common::{Error, Nivel, Password, Result, User, Username};
use nivelver_storage::{CloudStore, CloudUser, LiveQuery, LocalStore, RemoteMerge};

use crate::conflict::{resolve, Resolution};
use crate::report::{CloudWrite, FullSyncReport, PullReport, PushReport, SyncReport, WriteOutcome};
use crate::scheduler::SyncRequest;

/// Coordinates the local store and the cloud store for user accounts.
///
/// The local store is authoritative: every write lands there first and a
/// local failure is returned to the caller. The mirrored cloud write is
/// advisory; its failure is logged and reported in the [`WriteOutcome`]
/// but never turns a local success into an error. Reconciliation passes
/// repair whatever divergence that leaves behind.
///
/// Passes are serialized: at most one pull, push or full sync runs at a
/// time, and a full sync holds the pass lock across both halves.
pub struct SyncCoordinator<C: CloudStore + ?Sized> {
    local: Arc<LocalStore>,
    cloud: Arc<C>,
    pass_lock: tokio::sync::Mutex<()>,
    initial_sync: Mutex<Option<JoinHandle<Result<PullReport>>>>,
}

impl<C: CloudStore + ?Sized + 'static> SyncCoordinator<C> {
    /// Create a coordinator without starting a background pass.
    pub fn new(local: Arc<LocalStore>, cloud: Arc<C>) -> Self {
        Self {
            local,
            cloud,
            pass_lock: tokio::sync::Mutex::new(()),
            initial_sync: Mutex::new(None),
        }
    }

    /// Create a coordinator and spawn the initial pull in the background.
    ///
    /// Must be called from within a tokio runtime. The pull never blocks
    /// the caller and its failure does not fail construction; await it
    /// with [`Self::wait_initial_sync`].
    pub fn start(local: Arc<LocalStore>, cloud: Arc<C>) -> Arc<Self> {
        let coordinator = Arc::new(Self::new(local, cloud));
        info!("Sync coordinator initialized ({} cloud)", coordinator.cloud.name());

        let background = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move { background.sync_from_cloud().await });

        match coordinator.initial_sync.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(_) => warn!("Initial sync handle lost: slot lock poisoned"),
        }
        coordinator
    }

    /// Wait for the initial background pull.
    ///
    /// Returns `None` if no pass was started or it was already awaited.
    pub async fn wait_initial_sync(&self) -> Result<Option<PullReport>> {
        let handle = {
            let mut slot = self
                .initial_sync
                .lock()
                .map_err(|_| Error::Internal("Initial sync slot poisoned".to_string()))?;
            slot.take()
        };

        match handle {
            Some(handle) => {
                let report = handle
                    .await
                    .map_err(|e| Error::Internal(format!("Initial sync task failed: {}", e)))??;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn cloud(&self) -> &Arc<C> {
        &self.cloud
    }

    /// Register a new account with the default nivel.
    pub async fn create_user(&self, username: &str, password: &str) -> Result<WriteOutcome<User>> {
        self.create_user_with_nivel(username, password, &Nivel::default())
            .await
    }

    /// Register a new account.
    ///
    /// # Errors
    /// - `Validation` for a blank username or password, before any store access
    /// - `AlreadyExists` / `LocalStorage` if the local write fails
    pub async fn create_user_with_nivel(
        &self,
        username: &str,
        password: &str,
        nivel: &Nivel,
    ) -> Result<WriteOutcome<User>> {
        let username = Username::new(username)?;
        let password = Password::new(password)?;

        let user = self
            .local
            .create_user(&username, &password, nivel)
            .await
            .inspect_err(|e| error!("Error creating user {}: {}", username, e))?;
        debug!("Local: user created: {}", user.username);

        // The cloud copy carries the digest and the local timestamp.
        let cloud = self.cloud.put_user(&CloudUser::from(&user)).await;
        let cloud = self.cloud_outcome(cloud, "User synced", &user.username);

        Ok(WriteOutcome { value: user, cloud })
    }

    /// Change an account's nivel.
    ///
    /// The returned value is whether a local record changed; an unknown
    /// user is a no-op locally.
    pub async fn update_user_nivel(&self, username: &str, nivel: &str) -> Result<WriteOutcome<bool>> {
        let username = Username::new(username)?;
        let nivel = Nivel::new(nivel)?;

        let changed = self
            .local
            .update_user_nivel(&username, &nivel)
            .await
            .inspect_err(|e| error!("Error updating nivel for {}: {}", username, e))?;
        debug!("Local: nivel updated: {} -> {} (changed: {})", username, nivel, changed);

        let cloud = self
            .cloud
            .update_user_nivel(username.as_str(), nivel.as_str())
            .await;
        let cloud = self.cloud_outcome(cloud, "Nivel synced", username.as_str());

        Ok(WriteOutcome {
            value: changed,
            cloud,
        })
    }

    fn cloud_outcome(&self, result: Result<()>, success: &str, username: &str) -> CloudWrite {
        match result {
            Ok(()) => {
                debug!("Cloud: {}: {}", success, username);
                CloudWrite::Synced
            }
            Err(e) => {
                warn!("Cloud: sync failed for {} (will retry later): {}", username, e);
                CloudWrite::Deferred {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Point lookup, served from the local store.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.local.get_user_by_username(username).await
    }

    /// Check credentials against the local store.
    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<Option<User>> {
        let username = Username::new(username)?;
        let password = Password::new(password)?;
        self.local.verify_user_password(&username, &password).await
    }

    /// Live snapshots of all users, served from the local store.
    pub fn get_all_users(&self) -> LiveQuery<User> {
        self.local.get_all_users()
    }

    /// Pull remote users into the local store.
    ///
    /// An unreachable cloud is not an error: the pass returns a report with
    /// `cloud_reachable = false` and touches nothing. Local failures abort
    /// the pass and are returned.
    pub async fn sync_from_cloud(&self) -> Result<PullReport> {
        let _pass = self.pass_lock.lock().await;
        self.pull().await
    }

    /// Push every local user to the cloud.
    ///
    /// Per-user failures are counted, never fatal.
    pub async fn sync_to_cloud(&self) -> Result<PushReport> {
        let _pass = self.pass_lock.lock().await;
        self.push().await
    }

    /// Pull, then push. A failed pull is returned without pushing.
    pub async fn force_full_sync(&self) -> Result<FullSyncReport> {
        let _pass = self.pass_lock.lock().await;
        info!("Starting full bidirectional sync");
        let pull = self.pull().await?;
        let push = self.push().await?;
        Ok(FullSyncReport { pull, push })
    }

    /// Run a reconciliation request from the scheduler.
    pub async fn run_request(&self, request: SyncRequest) -> Result<SyncReport> {
        match request {
            SyncRequest::Pull => self.sync_from_cloud().await.map(SyncReport::Pull),
            SyncRequest::Push => self.sync_to_cloud().await.map(SyncReport::Push),
            SyncRequest::Full => self.force_full_sync().await.map(SyncReport::Full),
        }
    }

    async fn pull(&self) -> Result<PullReport> {
        info!("Starting sync from cloud");

        let remote_users = match self.cloud.get_all_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!("Cloud unavailable, using local data: {}", e);
                return Ok(PullReport::unreachable());
            }
        };
        debug!("Got {} users from cloud", remote_users.len());

        let report = self
            .apply_remote(remote_users)
            .await
            .inspect_err(|e| error!("Sync from cloud failed: {}", e))?;

        info!("Sync from cloud completed: {}", report);
        Ok(report)
    }

    async fn apply_remote(&self, remote_users: Vec<CloudUser>) -> Result<PullReport> {
        let mut report = PullReport {
            cloud_reachable: true,
            fetched: remote_users.len(),
            ..PullReport::default()
        };

        for remote in remote_users {
            let remote = User::from(remote);
            let merge = self
                .local
                .merge_remote_user(&remote, |local, remote| {
                    resolve(Some(local), remote) == Resolution::OverwriteLocal
                })
                .await?;

            match merge {
                RemoteMerge::Created => {
                    report.created += 1;
                    debug!("Created from cloud: {} (remote {})", remote.username, remote.last_modified);
                }
                RemoteMerge::Updated { local_modified } => {
                    report.updated += 1;
                    debug!(
                        "Updated from cloud: {} (local {}, remote {})",
                        remote.username, local_modified, remote.last_modified
                    );
                }
                RemoteMerge::Unchanged { local_modified } => {
                    report.unchanged += 1;
                    debug!(
                        "Kept local: {} (local {}, remote {})",
                        remote.username, local_modified, remote.last_modified
                    );
                }
            }
        }

        Ok(report)
    }

    async fn push(&self) -> Result<PushReport> {
        info!("Starting sync to cloud");

        let users = self
            .local
            .list_users()
            .await
            .inspect_err(|e| error!("Sync to cloud failed: {}", e))?;

        let mut report = PushReport {
            attempted: users.len(),
            ..PushReport::default()
        };
        for user in &users {
            match self.cloud.put_user(&CloudUser::from(user)).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!("Failed to push {}: {}", user.username, e);
                    report.failed += 1;
                }
            }
        }

        info!("Sync to cloud completed: {}", report);
        Ok(report)
    }
}
