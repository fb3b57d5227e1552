//! Process-wide sync configuration
//!
//! Resolved once at startup with precedence environment > stored settings;
//! rebinding requires a restart. Environment variables use the
//! `ROSTER_SYNC_*` prefix.

use crate::schema::{default_schemas, NamingSchema};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use sync_common::{SyncError, SyncResult};

/// All configuration the sync subsystem reads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Keycloak base URL, e.g. `https://idp.example.org`
    pub idp_url: String,
    pub idp_realm: String,
    pub idp_client_id: String,
    pub idp_client_secret: String,

    /// Gates the scheduled runner
    pub sync_enabled: bool,

    /// Category id under which all schema-created categories live
    /// (0 = tree root)
    pub parent_category_id: i64,

    /// Ordered schema list; defaults to the built-in German-school set
    pub naming_schemas: Vec<NamingSchema>,

    /// Attribute consulted by teacher-detector rule 3
    pub teacher_role_attribute: String,
    pub teacher_role_value: String,

    /// Enables the suspend step of the user delta
    pub sync_suspend_users: bool,

    /// Enables the unenrol scan of the enrolment delta
    pub sync_unenroll_users: bool,

    pub auto_enroll_teachers: bool,
    pub auto_enroll_students: bool,

    /// Auth method stamped on created users and used to recognize
    /// previously sync-owned accounts
    pub auth_method: String,

    pub request_timeout_secs: u64,

    /// Total time one admin request may spend waiting out rate limits
    pub rate_limit_budget_secs: u64,

    /// Page size for IdP drains
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            idp_url: String::new(),
            idp_realm: String::new(),
            idp_client_id: String::new(),
            idp_client_secret: String::new(),
            sync_enabled: false,
            parent_category_id: 0,
            naming_schemas: default_schemas(),
            teacher_role_attribute: "sophomorixRole".to_string(),
            teacher_role_value: "teacher".to_string(),
            sync_suspend_users: false,
            sync_unenroll_users: false,
            auto_enroll_teachers: true,
            auto_enroll_students: true,
            auth_method: "oauth2".to_string(),
            request_timeout_secs: 30,
            rate_limit_budget_secs: 90,
            page_size: 100,
        }
    }
}

impl SyncConfig {
    /// Load stored settings from a JSON file (when present), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let text = fs::read_to_string(path)?;
                serde_json::from_str(&text)?
            }
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay `ROSTER_SYNC_*` environment variables
    pub fn apply_env(&mut self) {
        override_string(&mut self.idp_url, "ROSTER_SYNC_IDP_URL");
        override_string(&mut self.idp_realm, "ROSTER_SYNC_IDP_REALM");
        override_string(&mut self.idp_client_id, "ROSTER_SYNC_IDP_CLIENT_ID");
        override_string(&mut self.idp_client_secret, "ROSTER_SYNC_IDP_CLIENT_SECRET");
        override_bool(&mut self.sync_enabled, "ROSTER_SYNC_ENABLED");
        override_parse(&mut self.parent_category_id, "ROSTER_SYNC_PARENT_CATEGORY_ID");
        override_string(
            &mut self.teacher_role_attribute,
            "ROSTER_SYNC_TEACHER_ROLE_ATTRIBUTE",
        );
        override_string(&mut self.teacher_role_value, "ROSTER_SYNC_TEACHER_ROLE_VALUE");
        override_bool(&mut self.sync_suspend_users, "ROSTER_SYNC_SUSPEND_USERS");
        override_bool(&mut self.sync_unenroll_users, "ROSTER_SYNC_UNENROLL_USERS");
        override_bool(
            &mut self.auto_enroll_teachers,
            "ROSTER_SYNC_AUTO_ENROLL_TEACHERS",
        );
        override_bool(
            &mut self.auto_enroll_students,
            "ROSTER_SYNC_AUTO_ENROLL_STUDENTS",
        );
        override_string(&mut self.auth_method, "ROSTER_SYNC_AUTH_METHOD");
        override_parse(
            &mut self.request_timeout_secs,
            "ROSTER_SYNC_REQUEST_TIMEOUT_SECS",
        );
        override_parse(
            &mut self.rate_limit_budget_secs,
            "ROSTER_SYNC_RATE_LIMIT_BUDGET_SECS",
        );
        override_parse(&mut self.page_size, "ROSTER_SYNC_PAGE_SIZE");

        if let Ok(json) = std::env::var("ROSTER_SYNC_NAMING_SCHEMAS") {
            if let Ok(schemas) = serde_json::from_str::<Vec<NamingSchema>>(&json) {
                self.naming_schemas = schemas;
            }
        }
    }

    fn validate(&self) -> SyncResult<()> {
        if self.page_size == 0 {
            return Err(SyncError::validation("page_size must be positive"));
        }
        if self.naming_schemas.is_empty() {
            return Err(SyncError::validation(
                "at least one naming schema is required",
            ));
        }
        Ok(())
    }

    /// The idnumber prefixes the configured schemas emit. Courses without
    /// one of these prefixes are never claimed, modified, or unenrolled
    /// from.
    pub fn sync_prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self
            .naming_schemas
            .iter()
            .map(|s| s.idnumber_prefix().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        prefixes.sort();
        prefixes.dedup();
        prefixes
    }
}

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

fn override_bool(target: &mut bool, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => {}
        }
    }
}

fn override_parse<T: std::str::FromStr>(target: &mut T, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if let Ok(parsed) = value.parse() {
            *target = parsed;
        }
    }
}
