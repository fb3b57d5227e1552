//! Sync API surface: preview, start, status, cancel, ongoing
//!
//! All operations require an actor and an authorization check; the policy
//! itself is delegated to the host through [`Authorizer`]. `start` only
//! inserts the pending job row; the caller hands the receipt to a runner.

use crate::config::SyncConfig;
use crate::sync::{EngineDeps, PreviewReport, SyncEngine, SyncSelection};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use sync_common::{
    JobStatus, JobStore, NullProgress, SyncDirection, SyncError, SyncJob, SyncResult,
};
use uuid::Uuid;

/// At most one non-terminal job is permitted globally within this window
fn global_conflict_window() -> Duration {
    Duration::hours(1)
}

/// Repeat starts by the same actor inside this window are double-clicks
fn double_click_guard() -> Duration {
    Duration::seconds(5)
}

/// Host-delegated authorization policy
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn can_sync(&self, actor_id: i64) -> bool;
}

/// Permits every actor; the default for single-operator deployments
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn can_sync(&self, _actor_id: i64) -> bool {
        true
    }
}

/// Accepted start request
#[derive(Debug, Clone, Serialize)]
pub struct StartReceipt {
    pub ok: bool,
    pub sync_id: String,
}

/// Summary of the actor's live job
#[derive(Debug, Clone, Serialize)]
pub struct OngoingSync {
    pub sync_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub direction: SyncDirection,
}

/// The five sync operations over a shared job store
pub struct SyncService {
    job_store: Arc<dyn JobStore>,
    authorizer: Arc<dyn Authorizer>,
}

impl SyncService {
    pub fn new(job_store: Arc<dyn JobStore>) -> Self {
        Self {
            job_store,
            authorizer: Arc::new(AllowAll),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    async fn authorize(&self, actor_id: i64) -> SyncResult<()> {
        if self.authorizer.can_sync(actor_id).await {
            Ok(())
        } else {
            Err(SyncError::auth(format!(
                "actor {} is not permitted to synchronize",
                actor_id
            )))
        }
    }

    /// Run the compute phases and a membership scan without writing to the
    /// LMS. Safe to call concurrently with a running sync.
    pub async fn preview(
        &self,
        actor_id: i64,
        deps: EngineDeps,
        config: SyncConfig,
        selection: SyncSelection,
    ) -> SyncResult<PreviewReport> {
        self.authorize(actor_id).await?;
        let mut engine =
            SyncEngine::new(deps, config, Arc::new(NullProgress))?.with_selection(selection);
        engine.preview().await
    }

    /// Insert a pending job, guarding against concurrent and double-click
    /// starts. The receipt's `sync_id` goes to a runner.
    pub async fn start(
        &self,
        actor_id: i64,
        direction: SyncDirection,
    ) -> SyncResult<StartReceipt> {
        self.authorize(actor_id).await?;
        let now = Utc::now();

        if let Some(job) = self
            .job_store
            .any_nonterminal_since(now - global_conflict_window())
            .await?
        {
            return Err(SyncError::conflict(format!(
                "sync '{}' is already {:?}",
                job.sync_id, job.status
            )));
        }

        if let Some(job) = self.job_store.latest_for_actor(actor_id).await? {
            if now - job.created_at < double_click_guard() {
                return Err(SyncError::conflict(
                    "a sync was started moments ago; ignoring repeat request",
                ));
            }
        }

        let sync_id = format!("sync-{}", Uuid::new_v4());
        let job = SyncJob::new(sync_id.clone(), actor_id, direction);
        self.job_store.insert(&job).await?;

        log::info!("sync {} queued by actor {}", sync_id, actor_id);
        Ok(StartReceipt { ok: true, sync_id })
    }

    /// The job row plus its log tail (already bounded to the newest 100
    /// entries)
    pub async fn status(&self, actor_id: i64, sync_id: &str) -> SyncResult<SyncJob> {
        self.authorize(actor_id).await?;
        self.job_store
            .get(sync_id)
            .await?
            .ok_or_else(|| SyncError::validation(format!("unknown sync '{}'", sync_id)))
    }

    /// Cancel a pending or processing job. Returns whether the status
    /// changed; the engine stops at its next between-phase check.
    pub async fn cancel(&self, actor_id: i64, sync_id: &str) -> SyncResult<bool> {
        self.authorize(actor_id).await?;
        let mut job = self
            .job_store
            .get(sync_id)
            .await?
            .ok_or_else(|| SyncError::validation(format!("unknown sync '{}'", sync_id)))?;

        if job.transition(JobStatus::Cancelled) {
            self.job_store.update(&job).await?;
            log::info!("sync {} cancelled by actor {}", sync_id, actor_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// The actor's live job, if any
    pub async fn ongoing(&self, actor_id: i64) -> SyncResult<Option<OngoingSync>> {
        self.authorize(actor_id).await?;
        Ok(self
            .job_store
            .ongoing_for_actor(actor_id)
            .await?
            .map(|job| OngoingSync {
                sync_id: job.sync_id,
                status: job.status,
                progress: job.progress,
                direction: job.direction,
            }))
    }
}
