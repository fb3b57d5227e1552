//! Durable job records for long-running sync runs
//!
//! One [`SyncJob`] row exists per sync. The engine is the single writer;
//! status endpoints read last-committed snapshots. The row is the single
//! source of truth for progress, counters, and the log tail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of log entries retained on the job row
pub const MAX_LOG_TAIL: usize = 100;

/// Sync direction. Only IdP → LMS is implemented; the enum exists so the
/// job row and API stay wire-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    #[default]
    IdpToLms,
}

/// Lifecycle of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The ten engine phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    FetchUsers,
    ComputeUserDelta,
    ApplyUsers,
    FetchGroups,
    ComputeGroupDelta,
    ApplyGroups,
    FetchMemberships,
    ComputeEnrolmentDelta,
    ApplyEnrolments,
    Complete,
}

impl SyncPhase {
    /// 1-based phase number
    pub fn number(&self) -> u8 {
        match self {
            Self::FetchUsers => 1,
            Self::ComputeUserDelta => 2,
            Self::ApplyUsers => 3,
            Self::FetchGroups => 4,
            Self::ComputeGroupDelta => 5,
            Self::ApplyGroups => 6,
            Self::FetchMemberships => 7,
            Self::ComputeEnrolmentDelta => 8,
            Self::ApplyEnrolments => 9,
            Self::Complete => 10,
        }
    }

    /// Overall progress percentage at which this phase begins
    pub fn base_progress(&self) -> u8 {
        (self.number() - 1) * 10
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchUsers => "fetch_users",
            Self::ComputeUserDelta => "compute_user_delta",
            Self::ApplyUsers => "apply_users",
            Self::FetchGroups => "fetch_groups",
            Self::ComputeGroupDelta => "compute_group_delta",
            Self::ApplyGroups => "apply_groups",
            Self::FetchMemberships => "fetch_memberships",
            Self::ComputeEnrolmentDelta => "compute_enrolment_delta",
            Self::ApplyEnrolments => "apply_enrolments",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log severity for job log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One entry in the job's persisted log tail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub phase: Option<SyncPhase>,
}

impl JobLogEntry {
    pub fn info(phase: SyncPhase, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            message: message.into(),
            phase: Some(phase),
        }
    }

    pub fn warn(phase: SyncPhase, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warn,
            message: message.into(),
            phase: Some(phase),
        }
    }

    pub fn error(phase: SyncPhase, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            message: message.into(),
            phase: Some(phase),
        }
    }
}

/// A structured per-item failure recorded on the job row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub phase: SyncPhase,
    pub kind: String,
    pub identifier: String,
    pub message: String,
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.phase, self.identifier, self.kind, self.message
        )
    }
}

/// Run counters, published with every progress update and serialized into
/// the final summary
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncStats {
    pub users_created: u64,
    pub users_updated: u64,
    pub users_suspended: u64,
    pub users_skipped: u64,
    pub users_errors: u64,
    pub teachers_detected: u64,
    pub coursecreators_assigned: u64,
    pub courses_created: u64,
    pub courses_updated: u64,
    pub courses_skipped: u64,
    pub courses_errors: u64,
    pub groups_unmatched: u64,
    pub categories_found: u64,
    pub categories_created: u64,
    pub enrollments_created: u64,
    pub enrollments_updated: u64,
    pub enrollments_removed: u64,
    pub enrollments_skipped: u64,
    pub enrollments_errors: u64,
}

impl SyncStats {
    pub fn total_created(&self) -> u64 {
        self.users_created + self.courses_created + self.enrollments_created
    }

    pub fn total_updated(&self) -> u64 {
        self.users_updated + self.courses_updated + self.enrollments_updated
    }

    pub fn total_removed(&self) -> u64 {
        self.users_suspended + self.enrollments_removed
    }

    pub fn total_errors(&self) -> u64 {
        self.users_errors + self.courses_errors + self.enrollments_errors
    }
}

/// Durable record of one sync run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncJob {
    pub sync_id: String,
    pub actor_id: i64,
    pub direction: SyncDirection,
    pub status: JobStatus,
    /// Overall progress in `[0, 100]`
    pub progress: u8,
    pub phase: Option<SyncPhase>,
    pub processed: u64,
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub error_count: u64,
    pub errors: Vec<ErrorDetail>,
    pub log_tail: Vec<JobLogEntry>,
    pub stats: SyncStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Create a fresh pending job
    pub fn new(sync_id: impl Into<String>, actor_id: i64, direction: SyncDirection) -> Self {
        let now = Utc::now();
        Self {
            sync_id: sync_id.into(),
            actor_id,
            direction,
            status: JobStatus::Pending,
            progress: 0,
            phase: None,
            processed: 0,
            total: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            error_count: 0,
            errors: Vec::new(),
            log_tail: Vec::new(),
            stats: SyncStats::default(),
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status transition. Status is monotonic, except that
    /// `Cancelled` may supersede `Pending` or `Processing`. Returns whether
    /// the transition was applied.
    pub fn transition(&mut self, to: JobStatus) -> bool {
        let allowed = match (self.status, to) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending | JobStatus::Processing, JobStatus::Cancelled) => true,
            (JobStatus::Processing, JobStatus::Completed | JobStatus::Failed) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            _ => false,
        };
        if allowed {
            self.status = to;
            self.updated_at = Utc::now();
            if to.is_terminal() {
                self.finished_at = Some(self.updated_at);
            }
        }
        allowed
    }

    /// Append a log entry, keeping only the newest [`MAX_LOG_TAIL`] entries
    pub fn push_log(&mut self, entry: JobLogEntry) {
        self.log_tail.push(entry);
        if self.log_tail.len() > MAX_LOG_TAIL {
            let excess = self.log_tail.len() - MAX_LOG_TAIL;
            self.log_tail.drain(..excess);
        }
        self.updated_at = Utc::now();
    }

    /// Record a structured per-item failure and mirror it into the log tail
    pub fn record_error(&mut self, detail: ErrorDetail) {
        self.push_log(JobLogEntry::error(detail.phase, detail.to_string()));
        self.errors.push(detail);
        self.error_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_supersedes_pending_and_processing() {
        let mut job = SyncJob::new("s1", 1, SyncDirection::IdpToLms);
        assert!(job.transition(JobStatus::Cancelled));

        let mut job = SyncJob::new("s2", 1, SyncDirection::IdpToLms);
        assert!(job.transition(JobStatus::Processing));
        assert!(job.transition(JobStatus::Cancelled));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn terminal_status_is_final() {
        let mut job = SyncJob::new("s1", 1, SyncDirection::IdpToLms);
        assert!(job.transition(JobStatus::Processing));
        assert!(job.transition(JobStatus::Completed));
        assert!(!job.transition(JobStatus::Cancelled));
        assert!(!job.transition(JobStatus::Processing));
    }

    #[test]
    fn log_tail_is_bounded() {
        let mut job = SyncJob::new("s1", 1, SyncDirection::IdpToLms);
        for i in 0..(MAX_LOG_TAIL + 25) {
            job.push_log(JobLogEntry::info(SyncPhase::FetchUsers, format!("m{}", i)));
        }
        assert_eq!(job.log_tail.len(), MAX_LOG_TAIL);
        // Oldest entries were dropped
        assert_eq!(job.log_tail[0].message, "m25");
    }

    #[test]
    fn record_error_increments_counter() {
        let mut job = SyncJob::new("s1", 1, SyncDirection::IdpToLms);
        job.record_error(ErrorDetail {
            phase: SyncPhase::ApplyUsers,
            kind: "store".into(),
            identifier: "alice".into(),
            message: "duplicate email".into(),
        });
        assert_eq!(job.error_count, 1);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.log_tail.len(), 1);
        assert_eq!(job.log_tail[0].level, LogLevel::Error);
    }

    #[test]
    fn phase_numbers_are_ordered() {
        let phases = [
            SyncPhase::FetchUsers,
            SyncPhase::ComputeUserDelta,
            SyncPhase::ApplyUsers,
            SyncPhase::FetchGroups,
            SyncPhase::ComputeGroupDelta,
            SyncPhase::ApplyGroups,
            SyncPhase::FetchMemberships,
            SyncPhase::ComputeEnrolmentDelta,
            SyncPhase::ApplyEnrolments,
            SyncPhase::Complete,
        ];
        for (i, phase) in phases.iter().enumerate() {
            assert_eq!(phase.number() as usize, i + 1);
        }
        assert_eq!(SyncPhase::Complete.base_progress(), 90);
    }
}
