//! Run-scoped user cache built during the user phase
//!
//! Later phases resolve memberships against this table instead of
//! re-querying the LMS per member.

use std::collections::HashMap;

/// What later phases need to know about a synchronized user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserCacheEntry {
    pub lms_id: i64,
    pub is_teacher: bool,
}

/// `username → entry`, keyed lowercase. Lives for a single sync run.
#[derive(Debug, Default)]
pub struct UserCache {
    entries: HashMap<String, UserCacheEntry>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, username: &str, entry: UserCacheEntry) {
        self.entries.insert(username.to_lowercase(), entry);
    }

    pub fn get(&self, username: &str) -> Option<UserCacheEntry> {
        self.entries.get(&username.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut cache = UserCache::new();
        cache.insert(
            "Alice",
            UserCacheEntry {
                lms_id: 7,
                is_teacher: true,
            },
        );

        let entry = cache.get("ALICE").unwrap();
        assert_eq!(entry.lms_id, 7);
        assert!(entry.is_teacher);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_user_is_none() {
        let cache = UserCache::new();
        assert!(cache.get("nobody").is_none());
    }
}
