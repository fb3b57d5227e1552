//! The phased synchronization engine
//!
//! Ten strictly linear phases reconcile the LMS with the identity
//! provider's roster: users first (later phases depend on the user cache),
//! then courses, then memberships, then enrolments. Each phase publishes
//! progress through a single sink; cancellation is honored between phases
//! only, so partial mutations of a cancelled run remain applied.
//!
//! Per-item failures are counted and logged and the phase continues.
//! Phase-level failures (an unreachable IdP during a fetch phase, an
//! unexpected store error) abort the run. Every mutation is idempotent on
//! its natural key, so a failed run converges on rerun.

mod courses;
mod enrolments;
mod preview;
mod users;

pub use preview::{GroupMembershipPreview, PreviewReport};

use crate::cache::UserCache;
use crate::config::SyncConfig;
use crate::delta::{EnrolDelta, GroupDelta, UserDelta};
use crate::schema::{SchemaMatch, SchemaProcessor};
use crate::teachers::TeacherDetector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use sync_common::{
    CategoryStore, CourseStore, EnrolmentStore, ErrorDetail, IdentityProvider, IdpGroup, IdpUser,
    JobStore, ProgressSink, ProgressUpdate, SyncError, SyncPhase, SyncResult, SyncStats, UserStore,
};

/// The capability implementations the engine drives
#[derive(Clone)]
pub struct EngineDeps {
    pub idp: Arc<dyn IdentityProvider>,
    pub users: Arc<dyn UserStore>,
    pub courses: Arc<dyn CourseStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub enrolments: Arc<dyn EnrolmentStore>,
}

/// Optional narrowing of a run to items chosen from a preview.
/// `None` means everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSelection {
    /// Lowercase usernames to include
    pub users: Option<HashSet<String>>,
    /// Group names to include
    pub groups: Option<HashSet<String>>,
}

impl SyncSelection {
    /// A selection that includes everything
    pub fn all() -> Self {
        Self::default()
    }

    pub(crate) fn includes_user(&self, username: &str) -> bool {
        match &self.users {
            Some(selected) => selected.contains(username),
            None => true,
        }
    }

    pub(crate) fn includes_group(&self, name: &str) -> bool {
        match &self.groups {
            Some(selected) => selected.contains(name),
            None => true,
        }
    }
}

/// Outcome of a completed (or cancelled) run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub stats: SyncStats,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

/// A schema-matched group tracked across the course and enrolment phases
pub(crate) struct MatchedCourse {
    pub group: IdpGroup,
    pub schema_match: SchemaMatch,
    /// Filled during the course phases; `None` when the course failed to
    /// materialize
    pub course_id: Option<i64>,
    pub members: Vec<IdpUser>,
}

/// The ten-phase state machine. One instance drives one run.
pub struct SyncEngine {
    pub(crate) deps: EngineDeps,
    pub(crate) config: SyncConfig,
    pub(crate) processor: SchemaProcessor,
    pub(crate) detector: TeacherDetector,
    pub(crate) progress: Arc<dyn ProgressSink>,
    pub(crate) selection: SyncSelection,

    pub(crate) idp_users: Vec<IdpUser>,
    pub(crate) idp_groups: Vec<IdpGroup>,
    pub(crate) matched: Vec<MatchedCourse>,
    pub(crate) user_delta: UserDelta,
    pub(crate) group_delta: GroupDelta,
    pub(crate) enrol_delta: EnrolDelta,
    pub(crate) user_cache: UserCache,
    pub(crate) expected_enrolments: HashSet<(i64, i64)>,
    pub(crate) stats: SyncStats,
    pub(crate) warnings: Vec<String>,
}

impl SyncEngine {
    pub fn new(
        deps: EngineDeps,
        config: SyncConfig,
        progress: Arc<dyn ProgressSink>,
    ) -> SyncResult<Self> {
        let processor = SchemaProcessor::new(&config.naming_schemas)?;
        let detector = TeacherDetector::new(
            config.teacher_role_attribute.clone(),
            config.teacher_role_value.clone(),
        );

        Ok(Self {
            deps,
            config,
            processor,
            detector,
            progress,
            selection: SyncSelection::all(),
            idp_users: Vec::new(),
            idp_groups: Vec::new(),
            matched: Vec::new(),
            user_delta: UserDelta::default(),
            group_delta: GroupDelta::default(),
            enrol_delta: EnrolDelta::default(),
            user_cache: UserCache::new(),
            expected_enrolments: HashSet::new(),
            stats: SyncStats::default(),
            warnings: Vec::new(),
        })
    }

    /// Restrict the run to items chosen from a preview
    pub fn with_selection(mut self, selection: SyncSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Drive all ten phases. A cooperative cancel ends the run between
    /// phases and is reported, not raised; any other failure aborts.
    pub async fn run(&mut self) -> SyncResult<SyncReport> {
        match self.run_phases().await {
            Ok(()) => {
                self.complete().await?;
                Ok(self.report(false))
            }
            Err(SyncError::Cancelled) => {
                log::info!("sync cancelled between phases");
                Ok(self.report(true))
            }
            Err(err) => Err(err),
        }
    }

    async fn run_phases(&mut self) -> SyncResult<()> {
        self.fetch_users().await?;
        self.check_cancelled().await?;
        self.compute_user_delta().await?;
        self.check_cancelled().await?;
        self.apply_user_changes().await?;
        self.check_cancelled().await?;
        self.fetch_groups().await?;
        self.check_cancelled().await?;
        self.compute_group_delta().await?;
        self.check_cancelled().await?;
        self.apply_group_changes().await?;
        self.check_cancelled().await?;
        self.fetch_memberships().await?;
        self.check_cancelled().await?;
        self.compute_enrolment_delta().await?;
        self.check_cancelled().await?;
        self.apply_enrolments().await?;
        Ok(())
    }

    /// P10: final summary and 100% progress
    async fn complete(&mut self) -> SyncResult<()> {
        let summary = format!(
            "sync complete: {} created, {} updated, {} removed, {} errors",
            self.stats.total_created(),
            self.stats.total_updated(),
            self.stats.total_removed(),
            self.stats.total_errors()
        );
        log::info!("{}", summary);
        self.progress
            .log(sync_common::JobLogEntry::info(
                SyncPhase::Complete,
                summary.clone(),
            ))
            .await?;
        self.progress
            .publish(ProgressUpdate {
                phase: SyncPhase::Complete,
                progress: 100,
                message: summary,
                stats: self.stats,
                processed: 0,
                total: 0,
            })
            .await
    }

    fn report(&self, cancelled: bool) -> SyncReport {
        SyncReport {
            stats: self.stats,
            warnings: self.warnings.clone(),
            cancelled,
        }
    }

    pub(crate) async fn check_cancelled(&self) -> SyncResult<()> {
        if self.progress.is_cancelled().await {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Publish progress for a phase, interpolating within its tenth of the
    /// overall percentage
    pub(crate) async fn publish(
        &self,
        phase: SyncPhase,
        message: impl Into<String>,
        processed: u64,
        total: u64,
    ) -> SyncResult<()> {
        let within = if total > 0 {
            ((processed.min(total) * 10) / total) as u8
        } else {
            0
        };
        self.progress
            .publish(ProgressUpdate {
                phase,
                progress: (phase.base_progress() + within).min(100),
                message: message.into(),
                stats: self.stats,
                processed,
                total,
            })
            .await
    }

    /// Record a per-item failure; the caller bumps the matching counter
    pub(crate) async fn item_error(
        &self,
        phase: SyncPhase,
        identifier: &str,
        err: &SyncError,
    ) -> SyncResult<()> {
        log::warn!("{}: {} failed: {}", phase, identifier, err);
        self.progress
            .record_error(ErrorDetail {
                phase,
                kind: err.kind().to_string(),
                identifier: identifier.to_string(),
                message: err.to_string(),
            })
            .await
    }
}

/// Convenience binding used by runners: everything a run needs besides the
/// job row itself
pub struct SyncRuntime {
    pub config: SyncConfig,
    pub deps: EngineDeps,
    pub job_store: Arc<dyn JobStore>,
}
