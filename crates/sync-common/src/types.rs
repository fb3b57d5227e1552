//! Common data types shared between the IdP client and the sync engine

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user record from the identity provider.
///
/// `attributes` carries directory metadata such as `LDAP_ENTRY_DN`; the
/// teacher detector reads from it, so clients must request full (non-brief)
/// representations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdpUser {
    /// Opaque provider-side identifier
    pub id: String,

    /// Login name (unique within the realm)
    pub username: String,

    /// Email address
    #[serde(default)]
    pub email: Option<String>,

    /// Whether the account is enabled
    pub enabled: bool,

    /// Given name
    #[serde(default)]
    pub first_name: Option<String>,

    /// Family name
    #[serde(default)]
    pub last_name: Option<String>,

    /// Multi-valued directory attributes
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl IdpUser {
    /// First value of an attribute, matched case-insensitively by key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

/// A group record from the identity provider.
///
/// The provider returns a nested tree; everything past the client boundary
/// operates on the flattened form produced by [`flatten_groups`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdpGroup {
    /// Opaque provider-side identifier
    pub id: String,

    /// Group name (the schema processor's input)
    pub name: String,

    /// Full path, e.g. `/school/classes/10a`
    #[serde(default)]
    pub path: String,

    /// Parent group id, if any
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Child groups (empty in the flattened form)
    #[serde(default)]
    pub sub_groups: Vec<IdpGroup>,
}

/// Flatten a group tree in pre-order: every parent precedes its children and
/// sibling order is preserved. Each emitted node has `sub_groups` cleared.
pub fn flatten_groups(tree: Vec<IdpGroup>) -> Vec<IdpGroup> {
    let mut flat = Vec::new();
    for group in tree {
        push_flat(group, &mut flat);
    }
    flat
}

fn push_flat(mut group: IdpGroup, out: &mut Vec<IdpGroup>) {
    let children = std::mem::take(&mut group.sub_groups);
    out.push(group);
    for child in children {
        push_flat(child, out);
    }
}

/// A user row in the LMS.
///
/// Invariant: `username` and `email` are lowercase and unique among
/// non-deleted users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LmsUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub auth_method: String,
    pub first_name: String,
    pub last_name: String,
    pub suspended: bool,
    pub deleted: bool,
}

/// Fields for creating an LMS user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLmsUser {
    pub username: String,
    pub email: String,
    pub auth_method: String,
    pub first_name: String,
    pub last_name: String,
}

/// Partial update of an LMS user; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LmsUserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl LmsUserPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}

/// A course row in the LMS.
///
/// `idnumber` is the stable sync key; a course is sync-owned iff its
/// idnumber starts with one of the configured sync prefixes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LmsCourse {
    pub id: i64,
    pub idnumber: String,
    pub shortname: String,
    pub fullname: String,
    pub category_id: i64,
    pub format: String,
    pub visible: bool,
}

impl LmsCourse {
    /// Whether this course carries one of the known sync prefixes
    pub fn is_sync_owned(&self, prefixes: &[String]) -> bool {
        !self.idnumber.is_empty() && prefixes.iter().any(|p| self.idnumber.starts_with(p.as_str()))
    }
}

/// Fields for creating an LMS course
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLmsCourse {
    pub idnumber: String,
    pub shortname: String,
    pub fullname: String,
    pub category_id: i64,
    pub format: String,
    pub visible: bool,
}

/// Partial update of an LMS course; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LmsCoursePatch {
    pub idnumber: Option<String>,
    pub fullname: Option<String>,
    pub category_id: Option<i64>,
}

impl LmsCoursePatch {
    pub fn is_empty(&self) -> bool {
        self.idnumber.is_none() && self.fullname.is_none() && self.category_id.is_none()
    }
}

/// A node in the LMS category tree. The engine only ever creates nodes; it
/// never moves or deletes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LmsCategory {
    pub id: i64,
    pub name: String,
    pub parent_id: i64,
    /// Materialized path of names, e.g. `Classes/Grade 10`
    pub path: String,
}

/// Course roles the engine assigns via manual enrolment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnrolRole {
    #[default]
    Student,
    #[serde(rename = "editingteacher")]
    EditingTeacher,
}

impl EnrolRole {
    /// The LMS role shortname
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::EditingTeacher => "editingteacher",
        }
    }

    /// Parse an LMS role shortname
    pub fn parse(shortname: &str) -> Option<Self> {
        match shortname {
            "student" => Some(Self::Student),
            "editingteacher" => Some(Self::EditingTeacher),
            _ => None,
        }
    }
}

impl std::fmt::Display for EnrolRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manual enrolment with its assigned role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Enrolment {
    pub course_id: i64,
    pub user_id: i64,
    pub role: EnrolRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, name: &str, children: Vec<IdpGroup>) -> IdpGroup {
        IdpGroup {
            id: id.into(),
            name: name.into(),
            path: format!("/{}", name),
            parent_id: None,
            sub_groups: children,
        }
    }

    #[test]
    fn flatten_preserves_preorder() {
        let tree = vec![
            group("1", "a", vec![group("2", "a1", vec![]), group("3", "a2", vec![])]),
            group("4", "b", vec![]),
        ];

        let flat = flatten_groups(tree);
        let names: Vec<&str> = flat.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a1", "a2", "b"]);
        assert!(flat.iter().all(|g| g.sub_groups.is_empty()));
    }

    #[test]
    fn attribute_lookup_is_case_insensitive() {
        let mut user = IdpUser::default();
        user.attributes.insert(
            "LDAP_ENTRY_DN".to_string(),
            vec!["CN=alice,OU=Teachers,DC=x".to_string()],
        );

        assert_eq!(
            user.attribute("ldap_entry_dn"),
            Some("CN=alice,OU=Teachers,DC=x")
        );
        assert_eq!(user.attribute("missing"), None);
    }

    #[test]
    fn course_sync_ownership_requires_known_prefix() {
        let prefixes = vec!["kc_".to_string(), "kc_project_".to_string()];
        let mut course = LmsCourse {
            id: 1,
            idnumber: "kc_10a".into(),
            shortname: "10a".into(),
            fullname: "Class 10a".into(),
            category_id: 1,
            format: "topics".into(),
            visible: true,
        };
        assert!(course.is_sync_owned(&prefixes));

        course.idnumber = "handmade".into();
        assert!(!course.is_sync_owned(&prefixes));

        course.idnumber = String::new();
        assert!(!course.is_sync_owned(&prefixes));
    }
}
