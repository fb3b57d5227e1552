//! Naming schemas: regex-anchored recipes mapping group names to course
//! shapes
//!
//! The processor owns an ordered schema list. The first schema whose
//! pattern matches a group name wins; its capture groups feed the template
//! transformer, producing the course identity and the member-role table.
//! Outputs are deterministic: no clock or randomness participates.

use crate::template::{expand, TemplateMaps};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sync_common::{EnrolRole, SyncError, SyncResult};

/// Member-role table attached to a schema.
///
/// `default` applies to every member; `teacher` overrides it for members the
/// teacher detector flagged, when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleMap {
    pub default: EnrolRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<EnrolRole>,
}

impl RoleMap {
    /// Role for a member given the teacher flag
    pub fn role_for(&self, is_teacher: bool) -> EnrolRole {
        if is_teacher {
            self.teacher.unwrap_or(self.default)
        } else {
            self.default
        }
    }
}

/// One configurable naming schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamingSchema {
    pub id: String,
    /// Anchored regex tried against the group name
    pub match_pattern: String,
    pub idnumber_template: String,
    pub shortname_template: String,
    pub fullname_template: String,
    pub category_template: String,
    pub role_map: RoleMap,
}

impl NamingSchema {
    /// The literal idnumber prefix this schema emits (the template text
    /// before the first placeholder). Used for sync-ownership checks.
    pub fn idnumber_prefix(&self) -> &str {
        match self.idnumber_template.find('{') {
            Some(idx) => &self.idnumber_template[..idx],
            None => &self.idnumber_template,
        }
    }
}

/// The course shape produced by running one schema against one group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaMatch {
    pub schema_id: String,
    pub course_idnumber: String,
    pub course_shortname: String,
    pub course_fullname: String,
    pub category_path: String,
    pub role_map: RoleMap,
}

struct CompiledSchema {
    schema: NamingSchema,
    pattern: Regex,
}

/// Ordered schema list with compiled patterns and the named lookup tables
/// available to `map:` transforms
pub struct SchemaProcessor {
    schemas: Vec<CompiledSchema>,
    maps: TemplateMaps,
}

impl SchemaProcessor {
    /// Compile the given schema list. Invalid patterns surface as
    /// validation errors naming the schema.
    pub fn new(schemas: &[NamingSchema]) -> SyncResult<Self> {
        let compiled = schemas
            .iter()
            .map(|schema| {
                Regex::new(&schema.match_pattern)
                    .map(|pattern| CompiledSchema {
                        schema: schema.clone(),
                        pattern,
                    })
                    .map_err(|e| {
                        SyncError::validation(format!(
                            "schema '{}' has an invalid pattern: {}",
                            schema.id, e
                        ))
                    })
            })
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(Self {
            schemas: compiled,
            maps: default_maps(),
        })
    }

    /// Try each schema in order; the first match wins
    pub fn process(&self, name: &str, group_id: &str) -> Option<SchemaMatch> {
        for compiled in &self.schemas {
            let Some(captures) = compiled.pattern.captures(name) else {
                continue;
            };

            let mut vars = HashMap::new();
            vars.insert("name".to_string(), name.to_string());
            vars.insert("group_id".to_string(), group_id.to_string());
            for (idx, capture) in captures.iter().enumerate() {
                if let Some(m) = capture {
                    vars.insert(idx.to_string(), m.as_str().to_string());
                }
            }
            for capture_name in compiled.pattern.capture_names().flatten() {
                if let Some(m) = captures.name(capture_name) {
                    vars.insert(capture_name.to_string(), m.as_str().to_string());
                }
            }

            let schema = &compiled.schema;
            return Some(SchemaMatch {
                schema_id: schema.id.clone(),
                course_idnumber: expand(&schema.idnumber_template, &vars, &self.maps),
                course_shortname: expand(&schema.shortname_template, &vars, &self.maps),
                course_fullname: expand(&schema.fullname_template, &vars, &self.maps),
                category_path: expand(&schema.category_template, &vars, &self.maps),
                role_map: schema.role_map.clone(),
            });
        }

        None
    }
}

/// Subject display names for the `map:subject` transform
fn default_maps() -> TemplateMaps {
    let subject: HashMap<String, String> = [
        ("mathe", "Mathematik"),
        ("deutsch", "Deutsch"),
        ("englisch", "Englisch"),
        ("bio", "Biologie"),
        ("chemie", "Chemie"),
        ("physik", "Physik"),
        ("geschichte", "Geschichte"),
        ("erdkunde", "Erdkunde"),
        ("sport", "Sport"),
        ("musik", "Musik"),
        ("kunst", "Kunst"),
        ("informatik", "Informatik"),
        ("religion", "Religion"),
        ("ethik", "Ethik"),
        ("franzoesisch", "Französisch"),
        ("latein", "Latein"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut maps = TemplateMaps::new();
    maps.insert("subject".to_string(), subject);
    maps
}

fn student_teacher_roles() -> RoleMap {
    RoleMap {
        default: EnrolRole::Student,
        teacher: Some(EnrolRole::EditingTeacher),
    }
}

/// The built-in German-school schema set.
///
/// Ordering matters: the specific project shapes come before the catch-all.
/// Class courses use the `kc_` prefix, project courses `kc_project_`; class
/// group names cannot start with `p_`, so the idnumber spaces stay disjoint.
pub fn default_schemas() -> Vec<NamingSchema> {
    vec![
        NamingSchema {
            id: "class".into(),
            match_pattern: r"^(?P<grade>\d+)(?P<letter>[a-z])?$".into(),
            idnumber_template: "kc_{name|clean}".into(),
            shortname_template: "{name|upper}".into(),
            fullname_template: "Klasse {name|upper}".into(),
            category_template: "/Classes/Grade {name|extract_grade}".into(),
            role_map: student_teacher_roles(),
        },
        NamingSchema {
            id: "faculty".into(),
            match_pattern: r"^p_alle_(?P<subject>[a-z0-9]+)$".into(),
            idnumber_template: "kc_project_{name|clean}".into(),
            shortname_template: "FS {subject|map:subject}".into(),
            fullname_template: "Fachschaft {subject|map:subject}".into(),
            category_template: "/Projects/Faculties".into(),
            // Faculty groups hold teachers only
            role_map: RoleMap {
                default: EnrolRole::EditingTeacher,
                teacher: None,
            },
        },
        NamingSchema {
            id: "teacher_course".into(),
            match_pattern: r"^p_(?P<teacher>[a-z]+)_(?P<subject>[a-z0-9]+)_(?P<class>\d+[a-z]?)$"
                .into(),
            idnumber_template: "kc_project_{name|clean}".into(),
            shortname_template: "{subject|map:subject} {class|upper} {teacher|ucfirst}".into(),
            fullname_template: "{subject|map:subject} {class|upper} ({teacher|ucfirst})".into(),
            category_template: "/Projects/Subject Courses".into(),
            role_map: student_teacher_roles(),
        },
        NamingSchema {
            id: "class_course".into(),
            match_pattern: r"^p_(?P<class>\d+[a-z]?)_(?P<subject>[a-z0-9]+)$".into(),
            idnumber_template: "kc_project_{name|clean}".into(),
            shortname_template: "{subject|map:subject} {class|upper}".into(),
            fullname_template: "{subject|map:subject} {class|upper}".into(),
            category_template: "/Projects/Class Courses".into(),
            role_map: student_teacher_roles(),
        },
        NamingSchema {
            id: "extracurricular".into(),
            match_pattern: r"^p_(?P<activity>[a-z0-9_]+?)_ag$".into(),
            idnumber_template: "kc_project_{name|clean}".into(),
            shortname_template: "AG {activity|titlecase}".into(),
            fullname_template: "AG {activity|titlecase}".into(),
            category_template: "/Projects/Extracurricular".into(),
            role_map: student_teacher_roles(),
        },
        NamingSchema {
            id: "project".into(),
            match_pattern: r"^p_(?P<project>[a-z0-9_]+)$".into(),
            idnumber_template: "kc_project_{name|clean}".into(),
            shortname_template: "{project|titlecase}".into(),
            fullname_template: "Projekt {project|titlecase}".into(),
            category_template: "/Projects".into(),
            role_map: student_teacher_roles(),
        },
    ]
}
