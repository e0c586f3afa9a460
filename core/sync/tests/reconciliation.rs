//! End-to-end reconciliation between a local store and a memory cloud store.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Map, Value};

use nivelver_common::{Error, Password, User};
use nivelver_crypto::{Argon2Hasher, CredentialHasher, KdfParams};
use nivelver_storage::{CloudStore, CloudUser, LocalStore, MemoryCloudStore};
use nivelver_sync::{CloudWrite, SyncCoordinator};

fn hasher() -> Arc<Argon2Hasher> {
    Arc::new(Argon2Hasher::new(KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }))
}

fn setup() -> SyncCoordinator<MemoryCloudStore> {
    let local = Arc::new(LocalStore::in_memory(hasher()).unwrap());
    SyncCoordinator::new(local, Arc::new(MemoryCloudStore::new()))
}

fn local_user(username: &str, nivel: &str, last_modified: i64) -> User {
    User {
        username: username.to_string(),
        password: "digest".to_string(),
        nivel: nivel.to_string(),
        last_modified,
    }
}

fn remote_user(username: &str, nivel: &str, timestamp: i64) -> CloudUser {
    CloudUser {
        username: username.to_string(),
        password: "digest".to_string(),
        nivel: nivel.to_string(),
        timestamp,
    }
}

async fn local_nivel(coordinator: &SyncCoordinator<MemoryCloudStore>, username: &str) -> (String, i64) {
    let user = coordinator
        .get_user_by_username(username)
        .await
        .unwrap()
        .unwrap();
    (user.nivel, user.last_modified)
}

#[tokio::test]
async fn second_pull_without_remote_change_mutates_nothing() {
    let coordinator = setup();
    coordinator.cloud().put_user(&remote_user("ana", "A1", 200)).await.unwrap();
    coordinator.cloud().put_user(&remote_user("bob", "B2", 300)).await.unwrap();

    let first = coordinator.sync_from_cloud().await.unwrap();
    assert_eq!(first.created, 2);

    let second = coordinator.sync_from_cloud().await.unwrap();
    assert!(second.cloud_reachable);
    assert_eq!(second.fetched, 2);
    assert_eq!(second.mutations(), 0);
    assert_eq!(second.unchanged, 2);
}

#[tokio::test]
async fn newer_remote_overwrites_local() {
    let coordinator = setup();
    coordinator
        .local()
        .insert_user_record(&local_user("ana", "A0", 100))
        .await
        .unwrap();
    coordinator.cloud().put_user(&remote_user("ana", "B1", 200)).await.unwrap();

    let report = coordinator.sync_from_cloud().await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(local_nivel(&coordinator, "ana").await, ("B1".to_string(), 200));
}

#[tokio::test]
async fn equal_timestamps_keep_local() {
    let coordinator = setup();
    coordinator
        .local()
        .insert_user_record(&local_user("ana", "A0", 100))
        .await
        .unwrap();
    coordinator.cloud().put_user(&remote_user("ana", "C1", 100)).await.unwrap();

    let report = coordinator.sync_from_cloud().await.unwrap();

    assert_eq!(report.unchanged, 1);
    assert_eq!(local_nivel(&coordinator, "ana").await, ("A0".to_string(), 100));
}

#[tokio::test]
async fn stale_remote_is_ignored() {
    let coordinator = setup();
    coordinator
        .local()
        .insert_user_record(&local_user("ana", "B2", 100))
        .await
        .unwrap();
    coordinator.cloud().put_user(&remote_user("ana", "A0", 50)).await.unwrap();

    coordinator.sync_from_cloud().await.unwrap();

    assert_eq!(local_nivel(&coordinator, "ana").await, ("B2".to_string(), 100));
}

#[tokio::test]
async fn remote_only_user_is_created_and_can_log_in() {
    let coordinator = setup();
    let digest = hasher().hash(&Password::new("bob-secret").unwrap()).unwrap();
    coordinator
        .cloud()
        .put_user(&CloudUser {
            username: "bob".to_string(),
            password: digest.clone(),
            nivel: "A2".to_string(),
            timestamp: 500,
        })
        .await
        .unwrap();

    let report = coordinator.sync_from_cloud().await.unwrap();
    assert_eq!(report.created, 1);

    let bob = coordinator.get_user_by_username("bob").await.unwrap().unwrap();
    assert_eq!(bob.password, digest);
    assert_eq!(bob.last_modified, 500);

    coordinator.cloud().set_offline(true);
    let login = coordinator.verify_user_password("bob", "bob-secret").await.unwrap();
    assert_eq!(login.unwrap().nivel, "A2");
}

#[tokio::test]
async fn cloud_failure_does_not_fail_registration() {
    let coordinator = setup();
    coordinator.cloud().set_offline(true);

    let outcome = coordinator.create_user("carla", "pw").await.unwrap();

    assert!(matches!(outcome.cloud, CloudWrite::Deferred { .. }));
    assert!(coordinator.get_user_by_username("carla").await.unwrap().is_some());
    assert!(coordinator.cloud().is_empty().unwrap());
}

#[tokio::test]
async fn rejected_nivel_update_stays_local() {
    let coordinator = setup();
    coordinator.create_user("carla", "pw").await.unwrap();
    coordinator.cloud().fail_writes_for("carla").unwrap();

    let outcome = coordinator.update_user_nivel("carla", "B1").await.unwrap();

    assert!(outcome.value);
    assert!(!outcome.cloud.is_synced());
    assert_eq!(local_nivel(&coordinator, "carla").await.0, "B1");
    let remote = coordinator.cloud().get_user_by_username("carla").await.unwrap().unwrap();
    assert_eq!(remote.nivel, "A0");
}

#[tokio::test]
async fn push_repairs_deferred_writes() {
    let coordinator = setup();
    coordinator.cloud().set_offline(true);
    coordinator.create_user("carla", "pw").await.unwrap();
    coordinator.update_user_nivel("carla", "C1").await.unwrap();

    coordinator.cloud().set_offline(false);
    let report = coordinator.sync_to_cloud().await.unwrap();
    assert_eq!(report.succeeded, 1);

    let local = coordinator.get_user_by_username("carla").await.unwrap().unwrap();
    let remote = coordinator.cloud().get_user_by_username("carla").await.unwrap().unwrap();
    assert_eq!(remote, CloudUser::from(&local));
}

#[tokio::test]
async fn push_counts_partial_failures() {
    let coordinator = setup();
    for name in ["ana", "bob", "carla"] {
        coordinator
            .local()
            .insert_user_record(&local_user(name, "A0", 100))
            .await
            .unwrap();
    }
    coordinator.cloud().fail_writes_for("bob").unwrap();

    let report = coordinator.sync_to_cloud().await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert!(coordinator.cloud().get_user_by_username("carla").await.unwrap().is_some());
    assert!(coordinator.cloud().get_user_by_username("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_remote_record_is_skipped() {
    let coordinator = setup();
    coordinator.cloud().put_user(&remote_user("ana", "A1", 10)).await.unwrap();
    let mut broken: Map<String, Value> = Map::new();
    broken.insert("nivel".to_string(), json!("C2"));
    broken.insert("timestamp".to_string(), json!(99));
    coordinator.cloud().insert_document("broken", broken).unwrap();

    let report = coordinator.sync_from_cloud().await.unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.created, 1);
    assert_eq!(coordinator.local().list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_cloud_pull_succeeds_without_changes() {
    let coordinator = setup();
    coordinator
        .local()
        .insert_user_record(&local_user("ana", "A0", 100))
        .await
        .unwrap();
    coordinator.cloud().set_offline(true);

    let report = coordinator.sync_from_cloud().await.unwrap();

    assert!(!report.cloud_reachable);
    assert_eq!(report.mutations(), 0);
    assert_eq!(local_nivel(&coordinator, "ana").await, ("A0".to_string(), 100));
}

#[tokio::test]
async fn full_sync_stops_after_local_pull_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("nivelver.db");
    let local = Arc::new(LocalStore::open(&db_path, hasher()).unwrap());
    let cloud = Arc::new(MemoryCloudStore::new());
    cloud.put_user(&remote_user("ana", "A1", 10)).await.unwrap();
    let writes_before = cloud.write_attempts();

    // Break the local schema behind the store's back.
    let saboteur = rusqlite::Connection::open(&db_path).unwrap();
    saboteur.execute_batch("DROP TABLE users;").unwrap();

    let coordinator = SyncCoordinator::new(local, cloud);
    let err = coordinator.force_full_sync().await.unwrap_err();

    assert!(matches!(err, Error::LocalStorage(_)));
    assert!(err.is_fatal());
    assert_eq!(coordinator.cloud().write_attempts(), writes_before);
}

#[tokio::test]
async fn full_sync_pulls_then_pushes() {
    let coordinator = setup();
    coordinator.cloud().put_user(&remote_user("ana", "B1", 200)).await.unwrap();
    coordinator
        .local()
        .insert_user_record(&local_user("bob", "A2", 100))
        .await
        .unwrap();

    let report = coordinator.force_full_sync().await.unwrap();

    assert_eq!(report.pull.created, 1);
    assert_eq!(report.push.attempted, 2);
    assert_eq!(report.push.succeeded, 2);
    assert!(coordinator.cloud().get_user_by_username("bob").await.unwrap().is_some());
}

#[tokio::test]
async fn initial_pull_runs_in_background() {
    let local = Arc::new(LocalStore::in_memory(hasher()).unwrap());
    let cloud = Arc::new(MemoryCloudStore::new());
    cloud.put_user(&remote_user("ana", "A1", 10)).await.unwrap();

    let coordinator = SyncCoordinator::start(local, cloud);
    let report = coordinator.wait_initial_sync().await.unwrap().unwrap();

    assert_eq!(report.created, 1);
    assert!(coordinator.wait_initial_sync().await.unwrap().is_none());
}

#[tokio::test]
async fn initial_pull_failure_does_not_fail_construction() {
    let local = Arc::new(LocalStore::in_memory(hasher()).unwrap());
    let cloud = Arc::new(MemoryCloudStore::new());
    cloud.set_offline(true);

    let coordinator = SyncCoordinator::start(local, cloud);
    let report = coordinator.wait_initial_sync().await.unwrap().unwrap();
    assert!(!report.cloud_reachable);

    coordinator.create_user("ana", "pw").await.unwrap();
}

#[tokio::test]
async fn live_users_see_pulled_records() {
    let coordinator = setup();
    let mut users = coordinator.get_all_users();
    assert!(users.next().await.unwrap().unwrap().is_empty());

    coordinator.cloud().put_user(&remote_user("ana", "A1", 10)).await.unwrap();
    coordinator.sync_from_cloud().await.unwrap();

    let snapshot = users.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].username, "ana");
}

#[tokio::test]
async fn concurrent_passes_converge() {
    let coordinator = Arc::new(setup());
    for i in 0..5 {
        coordinator
            .cloud()
            .put_user(&remote_user(&format!("user{}", i), "A0", 10))
            .await
            .unwrap();
    }

    let passes: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.force_full_sync().await })
        })
        .collect();

    let mut created = 0;
    for pass in passes {
        created += pass.await.unwrap().unwrap().pull.created;
    }

    assert_eq!(created, 5);
    assert_eq!(coordinator.local().list_users().await.unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn local_update_racing_a_pull_is_never_lost() {
    for _ in 0..100 {
        let coordinator = Arc::new(setup());
        coordinator
            .local()
            .insert_user_record(&local_user("ana", "A0", 100))
            .await
            .unwrap();
        coordinator.cloud().put_user(&remote_user("ana", "B1", 200)).await.unwrap();

        let pull = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.sync_from_cloud().await })
        };
        let update = coordinator.update_user_nivel("ana", "C2").await.unwrap();
        pull.await.unwrap().unwrap();

        assert!(update.value);
        let (nivel, last_modified) = local_nivel(&coordinator, "ana").await;
        assert_eq!(nivel, "C2");
        assert!(last_modified > 200);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registration_racing_a_pull_does_not_abort_it() {
    for _ in 0..100 {
        let coordinator = Arc::new(setup());
        coordinator.cloud().put_user(&remote_user("ana", "A1", 200)).await.unwrap();
        coordinator.cloud().put_user(&remote_user("bob", "A2", 200)).await.unwrap();

        let pull = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.sync_from_cloud().await })
        };
        let registered = coordinator.create_user("ana", "pw").await;
        let report = pull.await.unwrap().unwrap();

        assert_eq!(report.fetched, 2);
        assert!(coordinator.get_user_by_username("bob").await.unwrap().is_some());
        match registered {
            Ok(_) => assert_eq!(report.created, 1),
            Err(e) => {
                assert!(matches!(e, Error::AlreadyExists(_)));
                assert_eq!(report.created, 2);
            }
        }
    }
}
