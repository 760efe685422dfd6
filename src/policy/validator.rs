use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::{Policy, PolicyField, SecondaryId, Surface};
use crate::storage::ReferenceLookup;

/// Field-level reasons a candidate policy was rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub errors: BTreeMap<String, String>,
}

impl ValidationFailure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. A second message for the same field is appended.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        self.errors
            .entry(field.into())
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&message);
            })
            .or_insert(message);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> Vec<&str> {
        self.errors.keys().map(String::as_str).collect()
    }

    fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy validation failed")?;
        for (field, message) in &self.errors {
            write!(f, "; {}: {}", field, message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

fn join_ids<T: fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check a candidate policy against enumerated and referential constraints.
///
/// `Ok(None)` means the candidate may be committed. `Ok(Some(_))` is a normal
/// rejection. `Err(_)` means the checks themselves could not be completed.
pub async fn validate<R>(policy: &Policy, refs: &R) -> anyhow::Result<Option<ValidationFailure>>
where
    R: ReferenceLookup + ?Sized,
{
    let mut failure = ValidationFailure::new();

    if policy.keybase().is_none() {
        failure.add(
            PolicyField::KeybaseMode.as_str(),
            format!("Invalid keybase mode: {:?}", policy.keybase_mode),
        );
    }

    for (criterion, rule) in &policy.rules {
        if let Err(message) = rule.check_shape() {
            failure.add(format!("rules.{}", criterion), message);
        }
    }

    let missing = refs.missing_services(&policy.services).await?;
    if !missing.is_empty() {
        failure.add(
            PolicyField::Services.as_str(),
            format!("Unknown services: {}", join_ids(&missing)),
        );
    }

    let missing = refs.missing_authorities(&policy.authorities).await?;
    if !missing.is_empty() {
        failure.add(
            PolicyField::Authorities.as_str(),
            format!("Unknown authorities: {}", join_ids(&missing)),
        );
    }

    let referenced: BTreeSet<SecondaryId> = Surface::ALL
        .iter()
        .filter_map(|surface| policy.secondary(*surface))
        .collect();

    if !referenced.is_empty() {
        let missing = refs.missing_secondaries(&referenced).await?;

        for surface in Surface::ALL {
            let Some(id) = policy.secondary(surface) else {
                continue;
            };
            if missing.contains(&id) {
                failure.add(
                    secondary_field(surface).as_str(),
                    format!("Unknown secondary authentication provider: {}", id),
                );
            }
        }
    }

    Ok(failure.into_option())
}

fn secondary_field(surface: Surface) -> PolicyField {
    match surface {
        Surface::Admin => PolicyField::AdminSecondary,
        Surface::User => PolicyField::UserSecondary,
        Surface::Proxy => PolicyField::ProxySecondary,
        Surface::Authority => PolicyField::AuthoritySecondary,
    }
}
