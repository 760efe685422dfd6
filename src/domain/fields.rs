use std::collections::BTreeSet;
use std::fmt;

use super::policy::Policy;

/// A mutable policy attribute.
///
/// The identifier has no variant here, so it can never be part of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyField {
    Name,
    Services,
    Authorities,
    Roles,
    Rules,
    KeybaseMode,
    AdminSecondary,
    UserSecondary,
    ProxySecondary,
    AuthoritySecondary,
    AdminDevice,
    UserDevice,
    ProxyDevice,
    AuthorityDevice,
}

impl PolicyField {
    pub const MUTABLE: [PolicyField; 14] = [
        PolicyField::Name,
        PolicyField::Services,
        PolicyField::Authorities,
        PolicyField::Roles,
        PolicyField::Rules,
        PolicyField::KeybaseMode,
        PolicyField::AdminSecondary,
        PolicyField::UserSecondary,
        PolicyField::ProxySecondary,
        PolicyField::AuthoritySecondary,
        PolicyField::AdminDevice,
        PolicyField::UserDevice,
        PolicyField::ProxyDevice,
        PolicyField::AuthorityDevice,
    ];

    /// Wire and column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyField::Name => "name",
            PolicyField::Services => "services",
            PolicyField::Authorities => "authorities",
            PolicyField::Roles => "roles",
            PolicyField::Rules => "rules",
            PolicyField::KeybaseMode => "keybase_mode",
            PolicyField::AdminSecondary => "admin_secondary",
            PolicyField::UserSecondary => "user_secondary",
            PolicyField::ProxySecondary => "proxy_secondary",
            PolicyField::AuthoritySecondary => "authority_secondary",
            PolicyField::AdminDevice => "admin_device",
            PolicyField::UserDevice => "user_device",
            PolicyField::ProxyDevice => "proxy_device",
            PolicyField::AuthorityDevice => "authority_device",
        }
    }
}

impl fmt::Display for PolicyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of attributes a commit overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet(BTreeSet<PolicyField>);

impl FieldSet {
    /// The commit set for an update: every mutable attribute, always.
    pub fn for_update() -> Self {
        FieldSet(PolicyField::MUTABLE.into_iter().collect())
    }

    pub fn contains(&self, field: PolicyField) -> bool {
        self.0.contains(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = PolicyField> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|f| f.as_str()).collect()
    }
}

impl FromIterator<PolicyField> for FieldSet {
    fn from_iter<I: IntoIterator<Item = PolicyField>>(iter: I) -> Self {
        FieldSet(iter.into_iter().collect())
    }
}

impl Policy {
    /// Copy one attribute from `source` into `self`.
    pub fn copy_field(&mut self, source: &Policy, field: PolicyField) {
        match field {
            PolicyField::Name => self.name = source.name.clone(),
            PolicyField::Services => self.services = source.services.clone(),
            PolicyField::Authorities => self.authorities = source.authorities.clone(),
            PolicyField::Roles => self.roles = source.roles.clone(),
            PolicyField::Rules => self.rules = source.rules.clone(),
            PolicyField::KeybaseMode => self.keybase_mode = source.keybase_mode.clone(),
            PolicyField::AdminSecondary => self.admin_secondary = source.admin_secondary,
            PolicyField::UserSecondary => self.user_secondary = source.user_secondary,
            PolicyField::ProxySecondary => self.proxy_secondary = source.proxy_secondary,
            PolicyField::AuthoritySecondary => {
                self.authority_secondary = source.authority_secondary
            }
            PolicyField::AdminDevice => self.admin_device = source.admin_device,
            PolicyField::UserDevice => self.user_device = source.user_device,
            PolicyField::ProxyDevice => self.proxy_device = source.proxy_device,
            PolicyField::AuthorityDevice => self.authority_device = source.authority_device,
        }
    }

    /// Overwrite the attributes named in `fields` with those of `source`.
    pub fn apply_fields(&mut self, source: &Policy, fields: &FieldSet) {
        for field in fields.iter() {
            self.copy_field(source, field);
        }
    }
}
