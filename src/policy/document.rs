use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::domain::id::optional_id;
use crate::domain::null_default;
use crate::domain::{
    AuthorityId, Policy, PolicyId, Rule, SecondaryId, ServiceId, DEFAULT_POLICY_NAME,
};

/// Errors that can occur while decoding a policy document.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed policy document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Untrusted policy input as submitted by a client.
///
/// Unknown fields (including `id`) are ignored; absent or `null` fields take
/// their zero value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PolicyDocument {
    #[serde(deserialize_with = "null_default")]
    pub name: Option<String>,

    #[serde(deserialize_with = "null_default")]
    pub services: BTreeSet<ServiceId>,

    #[serde(deserialize_with = "null_default")]
    pub authorities: BTreeSet<AuthorityId>,

    #[serde(deserialize_with = "null_default")]
    pub roles: BTreeSet<String>,

    #[serde(deserialize_with = "null_default")]
    pub rules: BTreeMap<String, Rule>,

    #[serde(deserialize_with = "null_default")]
    pub keybase_mode: String,

    #[serde(deserialize_with = "optional_id::deserialize")]
    pub admin_secondary: Option<SecondaryId>,
    #[serde(deserialize_with = "optional_id::deserialize")]
    pub user_secondary: Option<SecondaryId>,
    #[serde(deserialize_with = "optional_id::deserialize")]
    pub proxy_secondary: Option<SecondaryId>,
    #[serde(deserialize_with = "optional_id::deserialize")]
    pub authority_secondary: Option<SecondaryId>,

    #[serde(deserialize_with = "null_default")]
    pub admin_device: bool,
    #[serde(deserialize_with = "null_default")]
    pub user_device: bool,
    #[serde(deserialize_with = "null_default")]
    pub proxy_device: bool,
    #[serde(deserialize_with = "null_default")]
    pub authority_device: bool,
}

impl PolicyDocument {
    /// Decode a JSON document.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Decode from an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DecodeError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Build a creation candidate. A missing name takes the default.
    pub fn into_new_policy(self) -> Policy {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_POLICY_NAME.to_string());

        let mut policy = Policy {
            id: PolicyId::nil(),
            ..Default::default()
        };
        self.apply_to(&mut policy);
        policy.name = name;
        policy
    }

    /// Overlay every mutable attribute onto an existing policy.
    ///
    /// This is a full replace of the mutable surface: a missing name becomes
    /// empty rather than keeping the stored one. The id is untouched.
    pub fn apply_to(self, policy: &mut Policy) {
        policy.name = self.name.unwrap_or_default();
        policy.services = self.services;
        policy.authorities = self.authorities;
        policy.roles = self.roles;
        policy.rules = self.rules;
        policy.keybase_mode = self.keybase_mode;
        policy.admin_secondary = self.admin_secondary;
        policy.user_secondary = self.user_secondary;
        policy.proxy_secondary = self.proxy_secondary;
        policy.authority_secondary = self.authority_secondary;
        policy.admin_device = self.admin_device;
        policy.user_device = self.user_device;
        policy.proxy_device = self.proxy_device;
        policy.authority_device = self.authority_device;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_document_defaults() {
        let policy = PolicyDocument::decode(b"{}").unwrap().into_new_policy();

        assert_eq!(policy.name, DEFAULT_POLICY_NAME);
        assert!(policy.id.is_nil());
        assert!(policy.services.is_empty());
        assert!(policy.authorities.is_empty());
        assert!(policy.roles.is_empty());
        assert!(policy.rules.is_empty());
        assert_eq!(policy.keybase_mode, "");
        assert_eq!(policy.admin_secondary, None);
        assert!(!policy.user_device);
    }

    #[test]
    fn test_full_document() {
        let service = ServiceId::new();
        let secondary = SecondaryId::new();
        let doc = PolicyDocument::from_value(json!({
            "id": PolicyId::new().to_string(),
            "name": "VPN Policy",
            "services": [service.to_string()],
            "roles": ["admin", "ops"],
            "rules": {
                "location": { "type": "location", "disable": false, "values": ["US"] }
            },
            "keybase_mode": "required",
            "admin_secondary": secondary.to_string(),
            "user_secondary": "",
            "proxy_device": true,
            "unrelated": { "nested": 1 }
        }))
        .unwrap();

        let policy = doc.into_new_policy();

        assert!(policy.id.is_nil());
        assert_eq!(policy.name, "VPN Policy");
        assert!(policy.services.contains(&service));
        assert_eq!(policy.roles.len(), 2);
        assert_eq!(policy.rules["location"].values, vec!["US".to_string()]);
        assert_eq!(policy.keybase_mode, "required");
        assert_eq!(policy.admin_secondary, Some(secondary));
        assert_eq!(policy.user_secondary, None);
        assert!(policy.proxy_device);
    }

    #[test]
    fn test_explicit_empty_name_is_kept_on_create() {
        let policy = PolicyDocument::from_value(json!({ "name": "" }))
            .unwrap()
            .into_new_policy();
        assert_eq!(policy.name, "");
    }

    #[test]
    fn test_nulls_take_zero_values() {
        let doc = PolicyDocument::from_value(json!({
            "services": null,
            "rules": null,
            "admin_device": null,
            "keybase_mode": null
        }))
        .unwrap();

        assert!(doc.services.is_empty());
        assert!(doc.rules.is_empty());
        assert!(!doc.admin_device);
        assert_eq!(doc.keybase_mode, "");
    }

    #[test]
    fn test_nulls_inside_rules_take_zero_values() {
        let doc = PolicyDocument::decode(
            br#"{"rules":{"browser":{"type":"browser","disable":false,"values":null}}}"#,
        )
        .unwrap();

        let rule = &doc.rules["browser"];
        assert_eq!(rule.rule_type, "browser");
        assert!(rule.values.is_empty());
    }

    #[test]
    fn test_wrong_types_fail() {
        assert!(PolicyDocument::from_value(json!({ "roles": "admin" })).is_err());
        assert!(PolicyDocument::from_value(json!({ "admin_device": "yes" })).is_err());
        assert!(PolicyDocument::from_value(json!({ "services": ["not-an-id"] })).is_err());
        assert!(PolicyDocument::decode(b"{not json").is_err());
        assert!(PolicyDocument::decode(b"42").is_err());
    }

    #[test]
    fn test_apply_to_is_full_replace() {
        let id = PolicyId::new();
        let mut stored = Policy {
            id,
            name: "Stored".to_string(),
            roles: ["admin".to_string()].into_iter().collect(),
            user_device: true,
            keybase_mode: "optional".to_string(),
            ..Default::default()
        };

        PolicyDocument::from_value(json!({ "authorities": [] }))
            .unwrap()
            .apply_to(&mut stored);

        assert_eq!(stored.id, id);
        assert_eq!(stored.name, "");
        assert!(stored.roles.is_empty());
        assert!(!stored.user_device);
        assert_eq!(stored.keybase_mode, "");
    }
}
