//! Run-scoped delta structures
//!
//! The compute phases partition the difference between the LMS and the
//! IdP-dictated target state into these lists; the apply phases drain them.
//! All items are serializable so previews can return the same shapes the
//! real run uses.

use crate::schema::SchemaMatch;
use serde::Serialize;
use sync_common::{IdpGroup, IdpUser, LmsCourse, LmsCoursePatch, LmsUser, LmsUserPatch};

/// A user present at the IdP but absent from the LMS
#[derive(Debug, Clone, Serialize)]
pub struct UserCreate {
    pub idp_user: IdpUser,
}

/// A matched user whose name fields differ
#[derive(Debug, Clone, Serialize)]
pub struct UserUpdate {
    pub idp_user: IdpUser,
    pub lms_user: LmsUser,
    pub patch: LmsUserPatch,
    pub changed_fields: Vec<String>,
}

/// A user excluded from the run, with the reason
#[derive(Debug, Clone, Serialize)]
pub struct UserSkip {
    pub username: String,
    pub reason: String,
    /// Present when the skip is a matched-but-unchanged user; the apply
    /// phase still feeds these into the user cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idp_user: Option<IdpUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lms_user: Option<LmsUser>,
}

/// A previously synchronized user no longer present at the IdP
#[derive(Debug, Clone, Serialize)]
pub struct UserSuspend {
    pub lms_user: LmsUser,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserDelta {
    pub to_create: Vec<UserCreate>,
    pub to_update: Vec<UserUpdate>,
    pub to_suspend: Vec<UserSuspend>,
    pub to_skip: Vec<UserSkip>,
}

/// A schema-matched group with no existing course
#[derive(Debug, Clone, Serialize)]
pub struct CourseCreate {
    pub group: IdpGroup,
    pub schema_match: SchemaMatch,
}

/// A schema-matched group whose course needs patching
#[derive(Debug, Clone, Serialize)]
pub struct CourseUpdate {
    pub group: IdpGroup,
    pub schema_match: SchemaMatch,
    pub course: LmsCourse,
    pub patch: LmsCoursePatch,
}

/// A schema-matched group whose course is already in shape
#[derive(Debug, Clone, Serialize)]
pub struct CourseSkip {
    pub group_name: String,
    pub course_idnumber: String,
    pub reason: String,
}

/// A group no schema claimed, or that lost an idnumber collision
#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedGroup {
    pub group: IdpGroup,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupDelta {
    pub to_create: Vec<CourseCreate>,
    pub to_update: Vec<CourseUpdate>,
    pub to_skip: Vec<CourseSkip>,
    pub unmatched: Vec<UnmatchedGroup>,
}

/// A membership that needs a new manual enrolment
#[derive(Debug, Clone, Serialize)]
pub struct EnrolCreate {
    pub course_id: i64,
    pub course_idnumber: String,
    pub user_id: i64,
    pub username: String,
    pub role: sync_common::EnrolRole,
}

/// An enrolment whose assigned role differs from the role map
#[derive(Debug, Clone, Serialize)]
pub struct RoleChange {
    pub course_id: i64,
    pub course_idnumber: String,
    pub user_id: i64,
    pub username: String,
    pub old_role: sync_common::EnrolRole,
    pub new_role: sync_common::EnrolRole,
}

/// An enrolment on a sync-owned course with no backing membership
#[derive(Debug, Clone, Serialize)]
pub struct Unenrol {
    pub course_id: i64,
    pub course_idnumber: String,
    pub user_id: i64,
}

/// A membership excluded from enrolment, with the reason
#[derive(Debug, Clone, Serialize)]
pub struct EnrolSkip {
    pub username: String,
    pub course_idnumber: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrolDelta {
    pub to_enroll: Vec<EnrolCreate>,
    pub to_update_role: Vec<RoleChange>,
    pub to_unenroll: Vec<Unenrol>,
    pub to_skip: Vec<EnrolSkip>,
}
