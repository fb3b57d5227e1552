//! Job-row persistence and the job-backed progress writer
//!
//! The engine is the only writer of a job row; API readers get
//! last-committed snapshots. [`MemoryJobStore`] is the in-process
//! reference implementation; hosts with a database bind the same trait to
//! their `local_*_sync_jobs` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use sync_common::{
    ErrorDetail, JobLogEntry, JobStatus, JobStore, ProgressSink, ProgressUpdate, SyncError,
    SyncJob, SyncResult,
};

/// In-memory job store with row-level atomicity via a single mutex
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, SyncJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &SyncJob) -> SyncResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.sync_id) {
            return Err(SyncError::conflict(format!(
                "job '{}' already exists",
                job.sync_id
            )));
        }
        jobs.insert(job.sync_id.clone(), job.clone());
        Ok(())
    }

    async fn update(&self, job: &SyncJob) -> SyncResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job.sync_id) {
            return Err(SyncError::store(format!("job '{}' not found", job.sync_id)));
        }
        jobs.insert(job.sync_id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, sync_id: &str) -> SyncResult<Option<SyncJob>> {
        Ok(self.jobs.lock().unwrap().get(sync_id).cloned())
    }

    async fn ongoing_for_actor(&self, actor_id: i64) -> SyncResult<Option<SyncJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.actor_id == actor_id && !j.is_terminal())
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn any_nonterminal_since(&self, since: DateTime<Utc>) -> SyncResult<Option<SyncJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| !j.is_terminal() && j.created_at >= since)
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn latest_for_actor(&self, actor_id: i64) -> SyncResult<Option<SyncJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.actor_id == actor_id)
            .max_by_key(|j| j.created_at)
            .cloned())
    }
}

/// Progress sink that persists every emission to the job row.
///
/// Also answers the engine's between-phase cancellation checks from the
/// stored status, which an API client may have flipped to `Cancelled`.
pub struct JobProgressWriter {
    store: Arc<dyn JobStore>,
    sync_id: String,
}

impl JobProgressWriter {
    pub fn new(store: Arc<dyn JobStore>, sync_id: impl Into<String>) -> Self {
        Self {
            store,
            sync_id: sync_id.into(),
        }
    }

    async fn load(&self) -> SyncResult<SyncJob> {
        self.store
            .get(&self.sync_id)
            .await?
            .ok_or_else(|| SyncError::store(format!("job '{}' disappeared", self.sync_id)))
    }
}

#[async_trait]
impl ProgressSink for JobProgressWriter {
    async fn publish(&self, update: ProgressUpdate) -> SyncResult<()> {
        let mut job = self.load().await?;
        job.phase = Some(update.phase);
        job.progress = update.progress;
        job.processed = update.processed;
        job.total = update.total;
        job.stats = update.stats;
        job.created = update.stats.total_created();
        job.updated = update.stats.total_updated();
        job.deleted = update.stats.total_removed();
        job.push_log(JobLogEntry::info(update.phase, update.message));
        self.store.update(&job).await
    }

    async fn log(&self, entry: JobLogEntry) -> SyncResult<()> {
        let mut job = self.load().await?;
        job.push_log(entry);
        self.store.update(&job).await
    }

    async fn record_error(&self, detail: ErrorDetail) -> SyncResult<()> {
        let mut job = self.load().await?;
        job.record_error(detail);
        self.store.update(&job).await
    }

    async fn is_cancelled(&self) -> bool {
        matches!(
            self.store.get(&self.sync_id).await,
            Ok(Some(job)) if job.status == JobStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_common::{SyncDirection, SyncPhase, SyncStats};

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = MemoryJobStore::new();
        let job = SyncJob::new("s1", 1, SyncDirection::IdpToLms);
        store.insert(&job).await.unwrap();
        assert!(matches!(
            store.insert(&job).await,
            Err(SyncError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn ongoing_ignores_terminal_jobs() {
        let store = MemoryJobStore::new();
        let mut done = SyncJob::new("s1", 1, SyncDirection::IdpToLms);
        done.transition(JobStatus::Processing);
        done.transition(JobStatus::Completed);
        store.insert(&done).await.unwrap();

        assert!(store.ongoing_for_actor(1).await.unwrap().is_none());

        let live = SyncJob::new("s2", 1, SyncDirection::IdpToLms);
        store.insert(&live).await.unwrap();
        let found = store.ongoing_for_actor(1).await.unwrap().unwrap();
        assert_eq!(found.sync_id, "s2");
    }

    #[tokio::test]
    async fn progress_writer_updates_row_and_reports_cancellation() {
        let store = Arc::new(MemoryJobStore::new());
        let mut job = SyncJob::new("s1", 1, SyncDirection::IdpToLms);
        job.transition(JobStatus::Processing);
        store.insert(&job).await.unwrap();

        let writer = JobProgressWriter::new(store.clone(), "s1");
        assert!(!writer.is_cancelled().await);

        writer
            .publish(ProgressUpdate {
                phase: SyncPhase::FetchUsers,
                progress: 5,
                message: "fetching".into(),
                stats: SyncStats::default(),
                processed: 50,
                total: 100,
            })
            .await
            .unwrap();

        let mut stored = store.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.progress, 5);
        assert_eq!(stored.phase, Some(SyncPhase::FetchUsers));
        assert_eq!(stored.log_tail.len(), 1);

        stored.transition(JobStatus::Cancelled);
        store.update(&stored).await.unwrap();
        assert!(writer.is_cancelled().await);
    }
}
