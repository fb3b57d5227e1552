//! Capability traits at the seams of the sync engine
//!
//! Production implementations bind to the Keycloak admin API and the host
//! LMS data store; tests satisfy the same traits with in-memory maps.

use crate::error::SyncResult;
use crate::job::{JobLogEntry, SyncJob, SyncPhase, SyncStats};
use crate::types::{
    flatten_groups, Enrolment, EnrolRole, IdpGroup, IdpUser, LmsCategory, LmsCourse,
    LmsCoursePatch, LmsUser, LmsUserPatch, NewLmsCourse, NewLmsUser,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read/write access to the identity provider's roster.
///
/// Pagination contract: `list_users` and `list_group_members` return exactly
/// `max` items while more exist; a short page terminates the drain loop.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// One page of full (non-brief) user records
    async fn list_users(&self, first: usize, max: usize) -> SyncResult<Vec<IdpUser>>;

    /// Total number of users, for progress reporting
    async fn count_users(&self) -> SyncResult<usize>;

    /// The full nested group tree
    async fn get_group_tree(&self) -> SyncResult<Vec<IdpGroup>>;

    /// Every group in pre-order with `sub_groups` stripped
    async fn list_groups_flat(&self) -> SyncResult<Vec<IdpGroup>> {
        Ok(flatten_groups(self.get_group_tree().await?))
    }

    /// One page of a group's members
    async fn list_group_members(
        &self,
        group_id: &str,
        first: usize,
        max: usize,
    ) -> SyncResult<Vec<IdpUser>>;

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> SyncResult<()>;

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> SyncResult<()>;

    /// Create a user; returns the provider-assigned id
    async fn create_user(&self, user: &IdpUser) -> SyncResult<String>;

    async fn update_user(&self, user: &IdpUser) -> SyncResult<()>;
}

/// LMS user table access
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All non-deleted users
    async fn list_active_users(&self) -> SyncResult<Vec<LmsUser>>;

    /// Create a user; returns the new LMS id
    async fn create_user(&self, user: &NewLmsUser) -> SyncResult<i64>;

    async fn update_user(&self, id: i64, patch: &LmsUserPatch) -> SyncResult<()>;

    async fn suspend_user(&self, id: i64) -> SyncResult<()>;

    /// Grant the system-level `coursecreator` role. Idempotent; returns
    /// whether the role was newly assigned.
    async fn assign_course_creator(&self, user_id: i64) -> SyncResult<bool>;
}

/// LMS course table access
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn find_by_idnumber(&self, idnumber: &str) -> SyncResult<Option<LmsCourse>>;

    async fn find_by_shortname(&self, shortname: &str) -> SyncResult<Option<LmsCourse>>;

    /// Create a course; returns the new LMS id
    async fn create_course(&self, course: &NewLmsCourse) -> SyncResult<i64>;

    async fn update_course(&self, id: i64, patch: &LmsCoursePatch) -> SyncResult<()>;

    /// All courses whose idnumber starts with one of the given prefixes
    async fn list_courses_with_prefix(&self, prefixes: &[String]) -> SyncResult<Vec<LmsCourse>>;
}

/// LMS category tree access. Creation only; the engine never moves or
/// deletes categories.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn list_categories(&self) -> SyncResult<Vec<LmsCategory>>;

    async fn find_child(&self, name: &str, parent_id: i64) -> SyncResult<Option<LmsCategory>>;

    /// Create a child category; returns the new id
    async fn create_category(&self, name: &str, parent_id: i64) -> SyncResult<i64>;
}

/// Manual-enrolment access, including the role-assignment side
#[async_trait]
pub trait EnrolmentStore: Send + Sync {
    /// Existing manual enrolments with their assigned role for one course
    async fn list_manual_enrolments(&self, course_id: i64) -> SyncResult<Vec<Enrolment>>;

    /// Ensure a manual enrol instance exists on the course; returns its id
    async fn ensure_manual_instance(&self, course_id: i64) -> SyncResult<i64>;

    async fn enrol(&self, course_id: i64, user_id: i64, role: EnrolRole) -> SyncResult<()>;

    /// Swap the assigned role in the course context. The enrolment row is
    /// preserved so timestamps like `timestart` are unaffected.
    async fn change_role(
        &self,
        course_id: i64,
        user_id: i64,
        old: EnrolRole,
        new: EnrolRole,
    ) -> SyncResult<()>;

    /// Remove the user via every matching manual instance
    async fn unenrol(&self, course_id: i64, user_id: i64) -> SyncResult<()>;
}

/// Durable job-row storage shared between the engine (single writer) and
/// status endpoints (snapshot readers)
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &SyncJob) -> SyncResult<()>;

    /// Replace the stored row with the given snapshot
    async fn update(&self, job: &SyncJob) -> SyncResult<()>;

    async fn get(&self, sync_id: &str) -> SyncResult<Option<SyncJob>>;

    /// The actor's most recent non-terminal job, if any
    async fn ongoing_for_actor(&self, actor_id: i64) -> SyncResult<Option<SyncJob>>;

    /// Any non-terminal job created at or after `since`
    async fn any_nonterminal_since(&self, since: DateTime<Utc>) -> SyncResult<Option<SyncJob>>;

    /// The actor's most recently created job regardless of status
    async fn latest_for_actor(&self, actor_id: i64) -> SyncResult<Option<SyncJob>>;
}

/// One progress publication from the engine
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub phase: SyncPhase,
    /// Overall progress in `[0, 100]`
    pub progress: u8,
    pub message: String,
    pub stats: SyncStats,
    pub processed: u64,
    pub total: u64,
}

/// Receives progress from the engine and answers cancellation checks.
///
/// Updates arrive strictly in phase order, and within a phase in
/// item-processing order.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, update: ProgressUpdate) -> SyncResult<()>;

    /// Append an entry to the job's log tail
    async fn log(&self, entry: JobLogEntry) -> SyncResult<()>;

    /// Record a structured per-item failure
    async fn record_error(&self, detail: crate::job::ErrorDetail) -> SyncResult<()>;

    /// Polled by the engine between phases
    async fn is_cancelled(&self) -> bool {
        false
    }
}

/// A sink that drops everything; used by previews and tests
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn publish(&self, _update: ProgressUpdate) -> SyncResult<()> {
        Ok(())
    }

    async fn log(&self, _entry: JobLogEntry) -> SyncResult<()> {
        Ok(())
    }

    async fn record_error(&self, _detail: crate::job::ErrorDetail) -> SyncResult<()> {
        Ok(())
    }
}
