//! Integration tests for the sync API surface and the runners

use roster_sync_core::{
    run_sync, EngineDeps, MemoryIdp, MemoryJobStore, MemoryLms, SyncConfig, SyncContext,
    SyncRuntime, SyncSelection, SyncService,
};
use std::sync::Arc;
use sync_common::{IdpUser, JobStatus, JobStore, SyncDirection, SyncError};

fn idp_user(id: &str, username: &str) -> IdpUser {
    IdpUser {
        id: id.to_string(),
        username: username.to_string(),
        email: Some(format!("{}@example.org", username)),
        enabled: true,
        first_name: Some(username.to_string()),
        last_name: Some("X".to_string()),
        attributes: Default::default(),
    }
}

fn runtime() -> (SyncRuntime, Arc<MemoryJobStore>) {
    let idp = Arc::new(MemoryIdp::new().with_users(vec![idp_user("u1", "alice")]));
    let lms = Arc::new(MemoryLms::new());
    let job_store = Arc::new(MemoryJobStore::new());
    let runtime = SyncRuntime {
        config: SyncConfig::default(),
        deps: EngineDeps {
            idp,
            users: lms.clone(),
            courses: lms.clone(),
            categories: lms.clone(),
            enrolments: lms,
        },
        job_store: job_store.clone(),
    };
    (runtime, job_store)
}

// ============================================================================
// Start conflict guards (property 8)
// ============================================================================

#[tokio::test]
async fn second_start_conflicts_while_first_is_live() {
    let (_, job_store) = runtime();
    let service = SyncService::new(job_store);

    let receipt = service.start(1, SyncDirection::IdpToLms).await.unwrap();
    assert!(receipt.ok);

    // Any actor conflicts while a non-terminal job exists
    assert!(matches!(
        service.start(2, SyncDirection::IdpToLms).await,
        Err(SyncError::Conflict(_))
    ));
}

#[tokio::test]
async fn immediate_restart_by_same_actor_is_a_double_click() {
    let (_, job_store) = runtime();
    let service = SyncService::new(job_store.clone());

    let receipt = service.start(1, SyncDirection::IdpToLms).await.unwrap();

    // Finish the job so the global guard no longer applies
    let mut job = job_store.get(&receipt.sync_id).await.unwrap().unwrap();
    job.transition(JobStatus::Processing);
    job.transition(JobStatus::Completed);
    job_store.update(&job).await.unwrap();

    // Same actor within the guard window: rejected
    assert!(matches!(
        service.start(1, SyncDirection::IdpToLms).await,
        Err(SyncError::Conflict(_))
    ));

    // A different actor is fine
    assert!(service.start(2, SyncDirection::IdpToLms).await.is_ok());
}

// ============================================================================
// Status, cancel, ongoing
// ============================================================================

#[tokio::test]
async fn cancel_flips_live_jobs_only() {
    let (_, job_store) = runtime();
    let service = SyncService::new(job_store);

    let receipt = service.start(1, SyncDirection::IdpToLms).await.unwrap();

    assert!(service.cancel(1, &receipt.sync_id).await.unwrap());
    let job = service.status(1, &receipt.sync_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    // Second cancel is a no-op
    assert!(!service.cancel(1, &receipt.sync_id).await.unwrap());
}

#[tokio::test]
async fn ongoing_tracks_the_actors_live_job() {
    let (_, job_store) = runtime();
    let service = SyncService::new(job_store);

    assert!(service.ongoing(1).await.unwrap().is_none());

    let receipt = service.start(1, SyncDirection::IdpToLms).await.unwrap();
    let ongoing = service.ongoing(1).await.unwrap().unwrap();
    assert_eq!(ongoing.sync_id, receipt.sync_id);
    assert_eq!(ongoing.status, JobStatus::Pending);

    // Not visible to other actors
    assert!(service.ongoing(2).await.unwrap().is_none());

    service.cancel(1, &receipt.sync_id).await.unwrap();
    assert!(service.ongoing(1).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_sync_id_is_rejected() {
    let (_, job_store) = runtime();
    let service = SyncService::new(job_store);
    assert!(matches!(
        service.status(1, "sync-nope").await,
        Err(SyncError::Validation(_))
    ));
}

// ============================================================================
// Authorization delegation
// ============================================================================

struct DenyAll;

#[async_trait::async_trait]
impl roster_sync_core::Authorizer for DenyAll {
    async fn can_sync(&self, _actor_id: i64) -> bool {
        false
    }
}

#[tokio::test]
async fn unauthorized_actor_is_refused() {
    let (_, job_store) = runtime();
    let service = SyncService::new(job_store).with_authorizer(Arc::new(DenyAll));
    assert!(matches!(
        service.start(1, SyncDirection::IdpToLms).await,
        Err(SyncError::Auth(_))
    ));
}

// ============================================================================
// Runner lifecycle
// ============================================================================

#[tokio::test]
async fn run_sync_drives_job_to_completion() {
    let (runtime, job_store) = runtime();
    let service = SyncService::new(job_store.clone());
    let receipt = service.start(1, SyncDirection::IdpToLms).await.unwrap();

    let report = run_sync(
        &runtime,
        SyncContext {
            sync_id: receipt.sync_id.clone(),
            direction: SyncDirection::IdpToLms,
            actor_id: 1,
            selection: SyncSelection::all(),
        },
    )
    .await
    .unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.stats.users_created, 1);

    let job = job_store.get(&receipt.sync_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.created, 1);
    assert!(job.finished_at.is_some());
    assert!(!job.log_tail.is_empty());
}

#[tokio::test]
async fn cancelled_before_start_never_runs() {
    let (runtime, job_store) = runtime();
    let service = SyncService::new(job_store.clone());
    let receipt = service.start(1, SyncDirection::IdpToLms).await.unwrap();
    service.cancel(1, &receipt.sync_id).await.unwrap();

    let report = run_sync(
        &runtime,
        SyncContext {
            sync_id: receipt.sync_id.clone(),
            direction: SyncDirection::IdpToLms,
            actor_id: 1,
            selection: SyncSelection::all(),
        },
    )
    .await
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.stats.users_created, 0);

    let job = job_store.get(&receipt.sync_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
}

// ============================================================================
// Selection narrowing
// ============================================================================

#[tokio::test]
async fn selection_restricts_the_run_to_chosen_users() {
    let idp = Arc::new(
        MemoryIdp::new().with_users(vec![idp_user("u1", "alice"), idp_user("u2", "bob")]),
    );
    let lms = Arc::new(MemoryLms::new());
    let job_store = Arc::new(MemoryJobStore::new());
    let runtime = SyncRuntime {
        config: SyncConfig::default(),
        deps: EngineDeps {
            idp,
            users: lms.clone(),
            courses: lms.clone(),
            categories: lms.clone(),
            enrolments: lms.clone(),
        },
        job_store: job_store.clone(),
    };

    let service = SyncService::new(job_store);
    let receipt = service.start(1, SyncDirection::IdpToLms).await.unwrap();

    let selection = SyncSelection {
        users: Some(["alice".to_string()].into_iter().collect()),
        groups: None,
    };
    let report = run_sync(
        &runtime,
        SyncContext {
            sync_id: receipt.sync_id,
            direction: SyncDirection::IdpToLms,
            actor_id: 1,
            selection,
        },
    )
    .await
    .unwrap();

    assert_eq!(report.stats.users_created, 1);
    let snapshot = lms.snapshot();
    assert_eq!(snapshot.users.len(), 1);
    assert_eq!(snapshot.users[0].username, "alice");
}
