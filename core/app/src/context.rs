//! Application context: the single owner of the stores and the coordinator.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use nivelver_common::{Error, Result};
use nivelver_crypto::{Argon2Hasher, CredentialHasher};
use nivelver_storage::{create_default_registry, CloudStore, LocalStore};
use nivelver_sync::{SyncCoordinator, SyncMode, SyncReport, SyncRequest, SyncScheduler};

use crate::config::AppConfig;
use crate::login::{login, LoginOutcome};
use crate::reachability::{Reachability, TcpReachability};

/// Coordinator over a cloud store chosen at runtime.
pub type Coordinator = SyncCoordinator<dyn CloudStore>;

/// Everything the application needs, built once at startup.
///
/// There is exactly one coordinator per context; share the context (or its
/// coordinator) by reference or `Arc` instead of building another.
pub struct AppContext {
    config: AppConfig,
    local: Arc<LocalStore>,
    coordinator: Arc<Coordinator>,
    reachability: Arc<dyn Reachability>,
    scheduler: Option<SyncScheduler>,
    scheduler_task: Option<JoinHandle<()>>,
}

impl AppContext {
    /// Build the context from configuration.
    ///
    /// Opens the local store, resolves the cloud backend and starts the
    /// coordinator. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - Invalid configuration or unknown cloud backend
    /// - Local store cannot be opened
    pub async fn init(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let cloud = create_default_registry()
            .resolve(&config.cloud.provider, config.cloud.config.clone())?;

        let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2Hasher::new(config.hashing.clone()));
        let path = config.database_path.clone();
        let local = tokio::task::spawn_blocking(move || LocalStore::open(path, hasher))
            .await
            .map_err(|e| Error::Internal(format!("Task error: {}", e)))??;

        let reachability = Arc::new(TcpReachability::from_config(&config.reachability));
        Ok(Self::with_components(config, Arc::new(local), cloud, reachability))
    }

    /// Assemble a context from already-built components.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_components(
        config: AppConfig,
        local: Arc<LocalStore>,
        cloud: Arc<dyn CloudStore>,
        reachability: Arc<dyn Reachability>,
    ) -> Self {
        let coordinator: Arc<Coordinator> = if config.sync.sync_on_start {
            SyncCoordinator::start(Arc::clone(&local), cloud)
        } else {
            Arc::new(SyncCoordinator::new(Arc::clone(&local), cloud))
        };

        let (scheduler, scheduler_task) = match config.sync.mode() {
            SyncMode::Manual => (None, None),
            mode => {
                let (scheduler, handle) = SyncScheduler::new(mode);
                let runner = Arc::clone(&coordinator);
                let task = tokio::spawn(handle.run(move |request| {
                    let coordinator = Arc::clone(&runner);
                    async move { coordinator.run_request(request).await }
                }));
                (Some(scheduler), Some(task))
            }
        };

        info!(
            "Application context ready: cloud={}, sync mode={:?}",
            config.cloud.provider,
            config.sync.mode()
        );

        Self {
            config,
            local,
            coordinator,
            reachability,
            scheduler,
            scheduler_task,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn reachability(&self) -> &Arc<dyn Reachability> {
        &self.reachability
    }

    /// Run a reconciliation pass.
    ///
    /// Goes through the scheduler when one is running so requests and
    /// periodic passes never overlap.
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncReport> {
        match &self.scheduler {
            Some(scheduler) => scheduler.request(request).await,
            None => self.coordinator.run_request(request).await,
        }
    }

    /// Check credentials and build the user-facing outcome.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        login(self.coordinator.as_ref(), self.reachability.as_ref(), username, password).await
    }

    /// Stop background work and flush the local store.
    pub async fn close(mut self) -> Result<()> {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        if let Some(task) = self.scheduler_task.take() {
            if let Err(e) = task.await {
                warn!("Sync scheduler task ended abnormally: {}", e);
            }
        }

        match self.coordinator.wait_initial_sync().await {
            Ok(Some(report)) => info!("Initial sync finished: {}", report),
            Ok(None) => {}
            Err(e) => warn!("Initial sync failed: {}", e),
        }

        self.local.close().await?;
        info!("Application context closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::StaticReachability;
    use nivelver_crypto::KdfParams;
    use nivelver_storage::{CloudUser, MemoryCloudStore};

    fn test_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.database_path = dir.join("nivelver.db");
        config.hashing = KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        };
        config
    }

    #[tokio::test]
    async fn test_init_with_memory_cloud() {
        let tmp = tempfile::tempdir().unwrap();
        let context = AppContext::init(test_config(tmp.path())).await.unwrap();

        context
            .coordinator()
            .create_user("ana", "secret")
            .await
            .unwrap();
        let report = context.sync(SyncRequest::Push).await.unwrap();
        assert!(matches!(report, SyncReport::Push(p) if p.succeeded == 1));

        context.close().await.unwrap();
        assert!(tmp.path().join("nivelver.db").exists());
    }

    #[tokio::test]
    async fn test_unknown_cloud_provider() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path());
        config.cloud.provider = "dropbox".to_string();

        assert!(matches!(
            AppContext::init(config).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_startup_pull_and_offline_login() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let hasher = Arc::new(Argon2Hasher::new(config.hashing.clone()));
        let local = Arc::new(LocalStore::open(&config.database_path, hasher.clone()).unwrap());

        let cloud = Arc::new(MemoryCloudStore::new());
        let digest = hasher
            .hash(&nivelver_common::Password::new("secret").unwrap())
            .unwrap();
        cloud
            .put_user(&CloudUser {
                username: "ana".to_string(),
                password: digest,
                nivel: "B2".to_string(),
                timestamp: 10,
            })
            .await
            .unwrap();

        let context = AppContext::with_components(
            config,
            local,
            cloud,
            Arc::new(StaticReachability(false)),
        );
        let report = context.coordinator().wait_initial_sync().await.unwrap().unwrap();
        assert_eq!(report.created, 1);

        let outcome = context.login("ana", "secret").await.unwrap();
        assert_eq!(outcome.message(), "Welcome, ana! (offline mode)");
        context.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_periodic_mode_routes_through_scheduler() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path());
        config.sync.sync_on_start = false;
        config.sync.interval_secs = Some(3600);

        let context = AppContext::init(config).await.unwrap();
        let report = context.sync(SyncRequest::Full).await.unwrap();
        assert!(matches!(report, SyncReport::Full(_)));
        context.close().await.unwrap();
    }
}
