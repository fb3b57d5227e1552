//! Coarse group typing from name heuristics
//!
//! A convenience layer for schemas and reporting; the authoritative
//! course-shape decision belongs to the schema processor.

use regex::Regex;
use std::sync::OnceLock;

/// Coarse group categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// A school class, e.g. `10a` or `j1`
    Class,
    /// A `-teachers` shadow of another group
    TeacherShadow,
    /// A `p_`-prefixed project group
    Project,
    Other,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::TeacherShadow => "teacher_shadow",
            Self::Project => "project",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification result: the kind plus the cleaned identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: GroupKind,
    pub base_name: String,
}

fn class_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+[a-z]?|k1|k2|ks[12]|j[12])$").unwrap())
}

/// Classify a group by name. Rules are ordered; the first match wins.
pub fn classify(name: &str) -> Classification {
    if let Some(base) = name.strip_suffix("-teachers") {
        return Classification {
            kind: GroupKind::TeacherShadow,
            base_name: base.to_string(),
        };
    }

    if let Some(base) = name.strip_prefix("p_") {
        return Classification {
            kind: GroupKind::Project,
            base_name: base.to_string(),
        };
    }

    if class_pattern().is_match(name) {
        return Classification {
            kind: GroupKind::Class,
            base_name: name.to_string(),
        };
    }

    Classification {
        kind: GroupKind::Other,
        base_name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teacher_shadow_strips_suffix() {
        let c = classify("10a-teachers");
        assert_eq!(c.kind, GroupKind::TeacherShadow);
        assert_eq!(c.base_name, "10a");
    }

    #[test]
    fn project_strips_prefix() {
        let c = classify("p_theater_ag");
        assert_eq!(c.kind, GroupKind::Project);
        assert_eq!(c.base_name, "theater_ag");
    }

    #[test]
    fn class_patterns() {
        for name in ["10a", "7", "k1", "k2", "ks1", "ks2", "j1", "j2"] {
            assert_eq!(classify(name).kind, GroupKind::Class, "{}", name);
        }
    }

    #[test]
    fn shadow_beats_project_prefix() {
        // Ordered rules: the suffix check runs first
        let c = classify("p_theater-teachers");
        assert_eq!(c.kind, GroupKind::TeacherShadow);
        assert_eq!(c.base_name, "p_theater");
    }

    #[test]
    fn everything_else_is_other() {
        for name in ["staff", "10ab", "xyz-unknown", "ks3"] {
            assert_eq!(classify(name).kind, GroupKind::Other, "{}", name);
        }
    }
}
