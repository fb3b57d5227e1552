//! Keycloak wire models and conversions into the common types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sync_common::{IdpGroup, IdpUser};

/// Keycloak user representation (camelCase wire format)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUser {
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Vec<String>>,
}

impl From<KeycloakUser> for IdpUser {
    fn from(user: KeycloakUser) -> Self {
        IdpUser {
            id: user.id.unwrap_or_default(),
            username: user.username,
            email: user.email,
            enabled: user.enabled,
            first_name: user.first_name,
            last_name: user.last_name,
            attributes: user.attributes,
        }
    }
}

impl From<&IdpUser> for KeycloakUser {
    fn from(user: &IdpUser) -> Self {
        KeycloakUser {
            id: if user.id.is_empty() {
                None
            } else {
                Some(user.id.clone())
            },
            username: user.username.clone(),
            email: user.email.clone(),
            enabled: user.enabled,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            attributes: user.attributes.clone(),
        }
    }
}

/// Keycloak group representation; the admin API nests children under
/// `subGroups`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sub_groups: Vec<KeycloakGroup>,
}

impl KeycloakGroup {
    /// Convert into the common tree form, filling `parent_id` along the way
    pub fn into_idp_group(self, parent_id: Option<&str>) -> IdpGroup {
        let id = self.id.clone();
        IdpGroup {
            id: self.id,
            name: self.name,
            path: self.path,
            parent_id: parent_id.map(str::to_string),
            sub_groups: self
                .sub_groups
                .into_iter()
                .map(|child| child.into_idp_group(Some(&id)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_conversion_fills_parent_ids() {
        let wire = KeycloakGroup {
            id: "g1".into(),
            name: "school".into(),
            path: "/school".into(),
            sub_groups: vec![KeycloakGroup {
                id: "g2".into(),
                name: "10a".into(),
                path: "/school/10a".into(),
                sub_groups: vec![],
            }],
        };

        let group = wire.into_idp_group(None);
        assert_eq!(group.parent_id, None);
        assert_eq!(group.sub_groups[0].parent_id.as_deref(), Some("g1"));
    }

    #[test]
    fn user_round_trip_keeps_attributes() {
        let mut attributes = HashMap::new();
        attributes.insert("sophomorixRole".to_string(), vec!["teacher".to_string()]);

        let wire = KeycloakUser {
            id: Some("u1".into()),
            username: "alice".into(),
            email: Some("alice@example.org".into()),
            enabled: true,
            first_name: Some("Alice".into()),
            last_name: Some("A".into()),
            attributes,
        };

        let user: IdpUser = wire.into();
        assert_eq!(user.attribute("sophomorixrole"), Some("teacher"));

        let back = KeycloakUser::from(&user);
        assert_eq!(back.id.as_deref(), Some("u1"));
        assert_eq!(back.username, "alice");
    }

    #[test]
    fn brief_user_payload_deserializes() {
        // Fields missing from brief representations default cleanly
        let user: KeycloakUser =
            serde_json::from_str(r#"{"username": "bob", "enabled": true}"#).unwrap();
        assert_eq!(user.username, "bob");
        assert!(user.attributes.is_empty());
        assert!(user.email.is_none());
    }
}
