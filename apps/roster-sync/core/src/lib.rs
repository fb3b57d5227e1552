//! # roster-sync-core
//!
//! Phased synchronization of an LMS against an external identity
//! provider: users, a schema-derived course catalog in a nested category
//! tree, and role-mapped enrolments, applied under a durable,
//! progress-reporting job.
//!
//! The engine ([`sync::SyncEngine`]) drives ten linear phases over
//! capability traits defined in `sync-common`; `keycloak-admin` provides
//! the production identity-provider client. [`memory`] holds in-memory
//! store implementations used by the CLI's local state file and the test
//! suite.

pub mod cache;
pub mod category;
pub mod classifier;
pub mod config;
pub mod delta;
pub mod export;
pub mod jobs;
pub mod memory;
pub mod runner;
pub mod schema;
pub mod service;
pub mod sync;
pub mod teachers;
pub mod template;

pub use cache::{UserCache, UserCacheEntry};
pub use category::{CategoryPathResolver, ResolverStats, DRY_RUN_CATEGORY_ID};
pub use classifier::{classify, Classification, GroupKind};
pub use config::SyncConfig;
pub use jobs::{JobProgressWriter, MemoryJobStore};
pub use memory::{LmsSnapshot, MemoryIdp, MemoryLms};
pub use runner::{build_idp_client, run_scheduled, run_sync, SyncContext};
pub use schema::{default_schemas, NamingSchema, RoleMap, SchemaMatch, SchemaProcessor};
pub use service::{AllowAll, Authorizer, OngoingSync, StartReceipt, SyncService};
pub use sync::{
    EngineDeps, GroupMembershipPreview, PreviewReport, SyncEngine, SyncReport, SyncRuntime,
    SyncSelection,
};
pub use teachers::TeacherDetector;
