//! Teacher detection over IdP user attributes
//!
//! Ordered rules, first match wins. The detector decides which role-map
//! branch a member takes and whether the system-level `coursecreator` role
//! is granted.

use sync_common::IdpUser;

/// Usernames treated as administrative accounts
pub const ADMIN_USERNAMES: &[&str] = &[
    "global-admin",
    "admin",
    "administrator",
    "moodle-admin",
    "keycloak-admin",
];

const LDAP_DN_ATTRIBUTE: &str = "LDAP_ENTRY_DN";
const TEACHERS_OU_MARKER: &str = "OU=Teachers";

/// Rule-based teacher classifier
#[derive(Debug, Clone)]
pub struct TeacherDetector {
    role_attribute: String,
    role_value: String,
}

impl TeacherDetector {
    /// `role_attribute` and `role_value` come from configuration
    /// (defaults: `sophomorixRole` / `teacher`).
    pub fn new(role_attribute: impl Into<String>, role_value: impl Into<String>) -> Self {
        Self {
            role_attribute: role_attribute.into(),
            role_value: role_value.into(),
        }
    }

    /// Classify a user. Rules in order:
    /// 1. Administrative username (fixed set, or `admin` substring)
    /// 2. `LDAP_ENTRY_DN` contains `OU=Teachers`
    /// 3. The configured role attribute equals the teacher value
    /// 4. Attribute `role` equals the teacher value
    /// 5. Attribute `userType` equals `teacher`
    pub fn is_teacher(&self, user: &IdpUser) -> bool {
        let username = user.username.to_lowercase();
        if ADMIN_USERNAMES.contains(&username.as_str()) || username.contains("admin") {
            return true;
        }

        if user
            .attribute(LDAP_DN_ATTRIBUTE)
            .is_some_and(|dn| dn.contains(TEACHERS_OU_MARKER))
        {
            return true;
        }

        if self.attribute_equals(user, &self.role_attribute, &self.role_value) {
            return true;
        }

        if self.attribute_equals(user, "role", &self.role_value) {
            return true;
        }

        if self.attribute_equals(user, "userType", "teacher") {
            return true;
        }

        false
    }

    fn attribute_equals(&self, user: &IdpUser, key: &str, expected: &str) -> bool {
        user.attribute(key)
            .is_some_and(|value| value.eq_ignore_ascii_case(expected))
    }
}

impl Default for TeacherDetector {
    fn default() -> Self {
        Self::new("sophomorixRole", "teacher")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(username: &str, attrs: &[(&str, &str)]) -> IdpUser {
        let mut user = IdpUser {
            username: username.to_string(),
            enabled: true,
            ..Default::default()
        };
        for (key, value) in attrs {
            user.attributes
                .insert(key.to_string(), vec![value.to_string()]);
        }
        user
    }

    #[test]
    fn admin_usernames_are_teachers() {
        let detector = TeacherDetector::default();
        for name in ADMIN_USERNAMES {
            assert!(detector.is_teacher(&user_with(name, &[])), "{}", name);
        }
        // Substring rule
        assert!(detector.is_teacher(&user_with("school-admin-2", &[])));
    }

    #[test]
    fn ldap_dn_rule() {
        let detector = TeacherDetector::default();
        let user = user_with("alice", &[("LDAP_ENTRY_DN", "CN=alice,OU=Teachers,DC=x")]);
        assert!(detector.is_teacher(&user));

        // Key lookup is case-insensitive
        let user = user_with("alice", &[("ldap_entry_dn", "CN=alice,OU=Teachers,DC=x")]);
        assert!(detector.is_teacher(&user));

        let user = user_with("bob", &[("LDAP_ENTRY_DN", "CN=bob,OU=Students,DC=x")]);
        assert!(!detector.is_teacher(&user));
    }

    #[test]
    fn configured_role_attribute_rule() {
        let detector = TeacherDetector::default();
        assert!(detector.is_teacher(&user_with("carol", &[("sophomorixRole", "Teacher")])));
        assert!(!detector.is_teacher(&user_with("carol", &[("sophomorixRole", "student")])));

        let custom = TeacherDetector::new("schoolRole", "lehrkraft");
        assert!(custom.is_teacher(&user_with("dave", &[("schoolRole", "Lehrkraft")])));
    }

    #[test]
    fn role_attribute_rule() {
        let detector = TeacherDetector::default();
        assert!(detector.is_teacher(&user_with("erin", &[("role", "teacher")])));
    }

    #[test]
    fn user_type_rule() {
        let detector = TeacherDetector::default();
        assert!(detector.is_teacher(&user_with("frank", &[("userType", "TEACHER")])));
    }

    #[test]
    fn no_rule_matches_means_student() {
        let detector = TeacherDetector::default();
        let user = user_with("grace", &[("sophomorixRole", "student"), ("userType", "pupil")]);
        assert!(!detector.is_teacher(&user));
    }
}
