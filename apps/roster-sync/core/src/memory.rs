//! In-memory implementations of the capability traits
//!
//! [`MemoryLms`] stands in for the host LMS data store: a serializable
//! state the engine mutates through the store traits. The CLI persists it
//! as a local state file; the integration tests inspect it directly.
//! [`MemoryIdp`] is a scripted identity provider with the same pagination
//! contract as the real admin API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use sync_common::{
    CategoryStore, CourseStore, Enrolment, EnrolmentStore, EnrolRole, IdentityProvider, IdpGroup,
    IdpUser, LmsCategory, LmsCourse, LmsCoursePatch, LmsUser, LmsUserPatch, NewLmsCourse,
    NewLmsUser, SyncError, SyncResult, UserStore,
};

/// Serializable snapshot of the in-memory LMS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LmsSnapshot {
    pub users: Vec<LmsUser>,
    pub courses: Vec<LmsCourse>,
    pub categories: Vec<LmsCategory>,
    pub enrolments: Vec<Enrolment>,
    pub course_creators: Vec<i64>,
    /// `(course_id, enrol_instance_id)` pairs
    pub manual_instances: Vec<(i64, i64)>,
}

#[derive(Debug, Default)]
struct LmsState {
    users: Vec<LmsUser>,
    courses: Vec<LmsCourse>,
    categories: Vec<LmsCategory>,
    enrolments: Vec<Enrolment>,
    course_creators: Vec<i64>,
    manual_instances: HashMap<i64, i64>,
    next_user_id: i64,
    next_course_id: i64,
    next_category_id: i64,
    next_instance_id: i64,
}

/// In-memory LMS satisfying all four store traits
#[derive(Debug, Default)]
pub struct MemoryLms {
    state: Mutex<LmsState>,
}

impl MemoryLms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a previously saved snapshot
    pub fn from_snapshot(snapshot: LmsSnapshot) -> Self {
        let next = |ids: &mut dyn Iterator<Item = i64>| ids.max().unwrap_or(0) + 1;
        let state = LmsState {
            next_user_id: next(&mut snapshot.users.iter().map(|u| u.id)),
            next_course_id: next(&mut snapshot.courses.iter().map(|c| c.id)),
            next_category_id: next(&mut snapshot.categories.iter().map(|c| c.id)),
            next_instance_id: next(&mut snapshot.manual_instances.iter().map(|(_, i)| *i)),
            users: snapshot.users,
            courses: snapshot.courses,
            categories: snapshot.categories,
            enrolments: snapshot.enrolments,
            course_creators: snapshot.course_creators,
            manual_instances: snapshot.manual_instances.into_iter().collect(),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Export the current state
    pub fn snapshot(&self) -> LmsSnapshot {
        let state = self.state.lock().unwrap();
        let mut manual_instances: Vec<(i64, i64)> =
            state.manual_instances.iter().map(|(k, v)| (*k, *v)).collect();
        manual_instances.sort_unstable();
        LmsSnapshot {
            users: state.users.clone(),
            courses: state.courses.clone(),
            categories: state.categories.clone(),
            enrolments: state.enrolments.clone(),
            course_creators: state.course_creators.clone(),
            manual_instances,
        }
    }

    /// Whether a user holds the system-level `coursecreator` role
    pub fn is_course_creator(&self, user_id: i64) -> bool {
        self.state
            .lock()
            .unwrap()
            .course_creators
            .contains(&user_id)
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryLms {
    async fn list_active_users(&self) -> SyncResult<Vec<LmsUser>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().filter(|u| !u.deleted).cloned().collect())
    }

    async fn create_user(&self, user: &NewLmsUser) -> SyncResult<i64> {
        let mut state = self.state.lock().unwrap();
        if state
            .users
            .iter()
            .any(|u| !u.deleted && (u.username == user.username || u.email == user.email))
        {
            return Err(SyncError::conflict(format!(
                "user '{}' collides on username or email",
                user.username
            )));
        }

        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.push(LmsUser {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            auth_method: user.auth_method.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            suspended: false,
            deleted: false,
        });
        Ok(id)
    }

    async fn update_user(&self, id: i64, patch: &LmsUserPatch) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id && !u.deleted)
            .ok_or_else(|| SyncError::store(format!("user {} not found", id)))?;

        if let Some(first_name) = &patch.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &patch.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        Ok(())
    }

    async fn suspend_user(&self, id: i64) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id && !u.deleted)
            .ok_or_else(|| SyncError::store(format!("user {} not found", id)))?;
        user.suspended = true;
        Ok(())
    }

    async fn assign_course_creator(&self, user_id: i64) -> SyncResult<bool> {
        let mut state = self.state.lock().unwrap();
        if state.course_creators.contains(&user_id) {
            return Ok(false);
        }
        state.course_creators.push(user_id);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl CourseStore for MemoryLms {
    async fn find_by_idnumber(&self, idnumber: &str) -> SyncResult<Option<LmsCourse>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .courses
            .iter()
            .find(|c| c.idnumber == idnumber)
            .cloned())
    }

    async fn find_by_shortname(&self, shortname: &str) -> SyncResult<Option<LmsCourse>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .courses
            .iter()
            .find(|c| c.shortname == shortname)
            .cloned())
    }

    async fn create_course(&self, course: &NewLmsCourse) -> SyncResult<i64> {
        let mut state = self.state.lock().unwrap();
        if state.courses.iter().any(|c| c.shortname == course.shortname) {
            return Err(SyncError::conflict(format!(
                "shortname '{}' already taken",
                course.shortname
            )));
        }

        state.next_course_id += 1;
        let id = state.next_course_id;
        state.courses.push(LmsCourse {
            id,
            idnumber: course.idnumber.clone(),
            shortname: course.shortname.clone(),
            fullname: course.fullname.clone(),
            category_id: course.category_id,
            format: course.format.clone(),
            visible: course.visible,
        });
        Ok(id)
    }

    async fn update_course(&self, id: i64, patch: &LmsCoursePatch) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        let course = state
            .courses
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SyncError::store(format!("course {} not found", id)))?;

        if let Some(idnumber) = &patch.idnumber {
            course.idnumber = idnumber.clone();
        }
        if let Some(fullname) = &patch.fullname {
            course.fullname = fullname.clone();
        }
        if let Some(category_id) = patch.category_id {
            course.category_id = category_id;
        }
        Ok(())
    }

    async fn list_courses_with_prefix(&self, prefixes: &[String]) -> SyncResult<Vec<LmsCourse>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .courses
            .iter()
            .filter(|c| c.is_sync_owned(prefixes))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl CategoryStore for MemoryLms {
    async fn list_categories(&self) -> SyncResult<Vec<LmsCategory>> {
        Ok(self.state.lock().unwrap().categories.clone())
    }

    async fn find_child(&self, name: &str, parent_id: i64) -> SyncResult<Option<LmsCategory>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .categories
            .iter()
            .find(|c| c.name == name && c.parent_id == parent_id)
            .cloned())
    }

    async fn create_category(&self, name: &str, parent_id: i64) -> SyncResult<i64> {
        let mut state = self.state.lock().unwrap();
        if state
            .categories
            .iter()
            .any(|c| c.name == name && c.parent_id == parent_id)
        {
            return Err(SyncError::conflict(format!(
                "category '{}' already exists under {}",
                name, parent_id
            )));
        }

        let path = match state.categories.iter().find(|c| c.id == parent_id) {
            Some(parent) => format!("{}/{}", parent.path, name),
            None => name.to_string(),
        };

        state.next_category_id += 1;
        let id = state.next_category_id;
        state.categories.push(LmsCategory {
            id,
            name: name.to_string(),
            parent_id,
            path,
        });
        Ok(id)
    }
}

#[async_trait::async_trait]
impl EnrolmentStore for MemoryLms {
    async fn list_manual_enrolments(&self, course_id: i64) -> SyncResult<Vec<Enrolment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .enrolments
            .iter()
            .filter(|e| e.course_id == course_id)
            .copied()
            .collect())
    }

    async fn ensure_manual_instance(&self, course_id: i64) -> SyncResult<i64> {
        let mut state = self.state.lock().unwrap();
        if let Some(&instance) = state.manual_instances.get(&course_id) {
            return Ok(instance);
        }
        state.next_instance_id += 1;
        let instance = state.next_instance_id;
        state.manual_instances.insert(course_id, instance);
        Ok(instance)
    }

    async fn enrol(&self, course_id: i64, user_id: i64, role: EnrolRole) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.manual_instances.contains_key(&course_id) {
            return Err(SyncError::store(format!(
                "course {} has no manual enrol instance",
                course_id
            )));
        }
        if state
            .enrolments
            .iter()
            .any(|e| e.course_id == course_id && e.user_id == user_id)
        {
            return Err(SyncError::conflict(format!(
                "user {} already enrolled in course {}",
                user_id, course_id
            )));
        }
        state.enrolments.push(Enrolment {
            course_id,
            user_id,
            role,
        });
        Ok(())
    }

    async fn change_role(
        &self,
        course_id: i64,
        user_id: i64,
        old: EnrolRole,
        new: EnrolRole,
    ) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        let enrolment = state
            .enrolments
            .iter_mut()
            .find(|e| e.course_id == course_id && e.user_id == user_id && e.role == old)
            .ok_or_else(|| {
                SyncError::store(format!(
                    "no {} enrolment for user {} in course {}",
                    old, user_id, course_id
                ))
            })?;
        enrolment.role = new;
        Ok(())
    }

    async fn unenrol(&self, course_id: i64, user_id: i64) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .enrolments
            .retain(|e| !(e.course_id == course_id && e.user_id == user_id));
        Ok(())
    }
}

/// Scripted identity provider honoring the offset-pagination contract
#[derive(Debug, Default)]
pub struct MemoryIdp {
    users: Mutex<Vec<IdpUser>>,
    groups: Mutex<Vec<IdpGroup>>,
    members: Mutex<HashMap<String, Vec<IdpUser>>>,
    member_fetches: Mutex<Vec<String>>,
}

impl MemoryIdp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(self, users: Vec<IdpUser>) -> Self {
        *self.users.lock().unwrap() = users;
        self
    }

    pub fn with_groups(self, groups: Vec<IdpGroup>) -> Self {
        *self.groups.lock().unwrap() = groups;
        self
    }

    pub fn set_members(&self, group_id: &str, members: Vec<IdpUser>) {
        self.members
            .lock()
            .unwrap()
            .insert(group_id.to_string(), members);
    }

    pub fn remove_member(&self, group_id: &str, username: &str) {
        if let Some(members) = self.members.lock().unwrap().get_mut(group_id) {
            members.retain(|m| m.username != username);
        }
    }

    /// Group ids whose members were fetched, in fetch order
    pub fn member_fetches(&self) -> Vec<String> {
        self.member_fetches.lock().unwrap().clone()
    }

    fn page<T: Clone>(items: &[T], first: usize, max: usize) -> Vec<T> {
        items.iter().skip(first).take(max).cloned().collect()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MemoryIdp {
    async fn list_users(&self, first: usize, max: usize) -> SyncResult<Vec<IdpUser>> {
        Ok(Self::page(&self.users.lock().unwrap(), first, max))
    }

    async fn count_users(&self) -> SyncResult<usize> {
        Ok(self.users.lock().unwrap().len())
    }

    async fn get_group_tree(&self) -> SyncResult<Vec<IdpGroup>> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn list_group_members(
        &self,
        group_id: &str,
        first: usize,
        max: usize,
    ) -> SyncResult<Vec<IdpUser>> {
        if first == 0 {
            self.member_fetches.lock().unwrap().push(group_id.to_string());
        }
        let members = self.members.lock().unwrap();
        Ok(Self::page(
            members.get(group_id).map(Vec::as_slice).unwrap_or(&[]),
            first,
            max,
        ))
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> SyncResult<()> {
        let user = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| SyncError::validation(format!("unknown user {}", user_id)))?;
        let mut members = self.members.lock().unwrap();
        let group = members.entry(group_id.to_string()).or_default();
        if !group.iter().any(|m| m.id == user.id) {
            group.push(user);
        }
        Ok(())
    }

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> SyncResult<()> {
        if let Some(members) = self.members.lock().unwrap().get_mut(group_id) {
            members.retain(|m| m.id != user_id);
        }
        Ok(())
    }

    async fn create_user(&self, user: &IdpUser) -> SyncResult<String> {
        let mut users = self.users.lock().unwrap();
        let id = format!("idp-{}", users.len() + 1);
        let mut user = user.clone();
        user.id = id.clone();
        users.push(user);
        Ok(id)
    }

    async fn update_user(&self, user: &IdpUser) -> SyncResult<()> {
        let mut users = self.users.lock().unwrap();
        let slot = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| SyncError::validation(format!("unknown user {}", user.id)))?;
        *slot = user.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_uniqueness_is_enforced() {
        let lms = MemoryLms::new();
        let user = NewLmsUser {
            username: "alice".into(),
            email: "alice@example.org".into(),
            auth_method: "oauth2".into(),
            first_name: "Alice".into(),
            last_name: "A".into(),
        };
        lms.create_user(&user).await.unwrap();
        assert!(matches!(
            lms.create_user(&user).await,
            Err(SyncError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn course_creator_grant_is_idempotent() {
        let lms = MemoryLms::new();
        assert!(lms.assign_course_creator(1).await.unwrap());
        assert!(!lms.assign_course_creator(1).await.unwrap());
        assert!(lms.is_course_creator(1));
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_ids() {
        let lms = MemoryLms::new();
        let id = lms
            .create_user(&NewLmsUser {
                username: "alice".into(),
                email: "alice@example.org".into(),
                auth_method: "oauth2".into(),
                first_name: "Alice".into(),
                last_name: "A".into(),
            })
            .await
            .unwrap();

        let restored = MemoryLms::from_snapshot(lms.snapshot());
        let next = restored
            .create_user(&NewLmsUser {
                username: "bob".into(),
                email: "bob@example.org".into(),
                auth_method: "oauth2".into(),
                first_name: "Bob".into(),
                last_name: "B".into(),
            })
            .await
            .unwrap();
        assert!(next > id);
    }

    #[tokio::test]
    async fn idp_member_fetches_are_recorded_once_per_group() {
        let idp = MemoryIdp::new();
        idp.set_members("g1", vec![]);
        idp.list_group_members("g1", 0, 50).await.unwrap();
        idp.list_group_members("g1", 50, 50).await.unwrap();
        assert_eq!(idp.member_fetches(), vec!["g1".to_string()]);
    }

    #[tokio::test]
    async fn enrol_requires_manual_instance() {
        let lms = MemoryLms::new();
        assert!(lms.enrol(1, 1, EnrolRole::Student).await.is_err());
        lms.ensure_manual_instance(1).await.unwrap();
        lms.enrol(1, 1, EnrolRole::Student).await.unwrap();
    }
}
