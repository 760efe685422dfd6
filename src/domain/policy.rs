use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::id::{optional_id, AuthorityId, PolicyId, SecondaryId, ServiceId};
use super::rule::Rule;

/// Name given to a policy created without one.
pub const DEFAULT_POLICY_NAME: &str = "New Policy";

/// Keybase verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeybaseMode {
    #[default]
    Disabled,
    Optional,
    Required,
}

impl KeybaseMode {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "" => Some(KeybaseMode::Disabled),
            "optional" => Some(KeybaseMode::Optional),
            "required" => Some(KeybaseMode::Required),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeybaseMode::Disabled => "",
            KeybaseMode::Optional => "optional",
            KeybaseMode::Required => "required",
        }
    }
}

/// Access surface a secondary-auth or device requirement applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Admin,
    User,
    Proxy,
    Authority,
}

impl Surface {
    pub const ALL: [Surface; 4] = [
        Surface::Admin,
        Surface::User,
        Surface::Proxy,
        Surface::Authority,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Admin => "admin",
            Surface::User => "user",
            Surface::Proxy => "proxy",
            Surface::Authority => "authority",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Access-control policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,

    pub name: String,

    /// Services this policy applies to
    pub services: BTreeSet<ServiceId>,

    /// Authorities this policy applies to
    pub authorities: BTreeSet<AuthorityId>,

    /// Roles granted access
    pub roles: BTreeSet<String>,

    /// Rules keyed by criterion name
    pub rules: BTreeMap<String, Rule>,

    pub keybase_mode: String,

    #[serde(with = "optional_id", default)]
    pub admin_secondary: Option<SecondaryId>,
    #[serde(with = "optional_id", default)]
    pub user_secondary: Option<SecondaryId>,
    #[serde(with = "optional_id", default)]
    pub proxy_secondary: Option<SecondaryId>,
    #[serde(with = "optional_id", default)]
    pub authority_secondary: Option<SecondaryId>,

    pub admin_device: bool,
    pub user_device: bool,
    pub proxy_device: bool,
    pub authority_device: bool,
}

impl Policy {
    /// Secondary-auth reference for a surface.
    pub fn secondary(&self, surface: Surface) -> Option<SecondaryId> {
        match surface {
            Surface::Admin => self.admin_secondary,
            Surface::User => self.user_secondary,
            Surface::Proxy => self.proxy_secondary,
            Surface::Authority => self.authority_secondary,
        }
    }

    /// Whether a registered device is required on a surface.
    pub fn device_required(&self, surface: Surface) -> bool {
        match surface {
            Surface::Admin => self.admin_device,
            Surface::User => self.user_device,
            Surface::Proxy => self.proxy_device,
            Surface::Authority => self.authority_device,
        }
    }

    pub fn keybase(&self) -> Option<KeybaseMode> {
        KeybaseMode::from_str(&self.keybase_mode)
    }
}
