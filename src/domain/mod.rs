pub mod fields;
pub mod id;
pub mod policy;
pub mod rule;

pub use fields::{FieldSet, PolicyField};
pub use id::{AuthorityId, PolicyId, SecondaryId, ServiceId};
pub use policy::{KeybaseMode, Policy, Surface, DEFAULT_POLICY_NAME};
pub use rule::{Rule, RuleType};

use serde::{Deserialize, Deserializer};

/// Decode an explicit `null` as the field's zero value.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
