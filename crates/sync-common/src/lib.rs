//! # Sync Common
//!
//! Common traits, types, and utilities for synchronizing an LMS with an
//! external identity provider.
//!
//! This crate provides:
//! - Capability traits at the engine's seams (`IdentityProvider`, the LMS
//!   store traits, `JobStore`, `ProgressSink`)
//! - Shared data types (`IdpUser`, `IdpGroup`, `LmsUser`, `LmsCourse`,
//!   `Enrolment`, `SyncJob`)
//! - Common error types

pub mod error;
pub mod job;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{SyncError, SyncResult};
pub use job::{
    ErrorDetail, JobLogEntry, JobStatus, LogLevel, SyncDirection, SyncJob, SyncPhase, SyncStats,
    MAX_LOG_TAIL,
};
pub use traits::{
    CategoryStore, CourseStore, EnrolmentStore, IdentityProvider, JobStore, NullProgress,
    ProgressSink, ProgressUpdate, UserStore,
};
pub use types::{
    flatten_groups, Enrolment, EnrolRole, IdpGroup, IdpUser, LmsCategory, LmsCourse,
    LmsCoursePatch, LmsUser, LmsUserPatch, NewLmsCourse, NewLmsUser,
};
