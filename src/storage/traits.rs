// src/storage/traits.rs
use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::domain::{AuthorityId, FieldSet, Policy, PolicyId, SecondaryId, ServiceId};

/// Durable policy persistence.
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// Store a new policy and return its freshly assigned id.
    ///
    /// Whatever id the candidate carries is ignored.
    async fn insert(&self, policy: &Policy) -> anyhow::Result<PolicyId>;

    async fn get(&self, id: PolicyId) -> anyhow::Result<Option<Policy>>;

    /// All policies in storage order.
    async fn get_all(&self) -> anyhow::Result<Vec<Policy>>;

    /// Overwrite exactly `fields` of the stored record.
    ///
    /// Fails if the record no longer exists.
    async fn replace(&self, id: PolicyId, policy: &Policy, fields: &FieldSet)
        -> anyhow::Result<()>;

    /// Delete a record. Returns whether a record was removed.
    async fn remove(&self, id: PolicyId) -> anyhow::Result<bool>;
}

/// Existence checks for resources a policy references.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// Ids from `ids` with no matching service.
    async fn missing_services(&self, ids: &BTreeSet<ServiceId>) -> anyhow::Result<Vec<ServiceId>>;

    /// Ids from `ids` with no matching authority.
    async fn missing_authorities(
        &self,
        ids: &BTreeSet<AuthorityId>,
    ) -> anyhow::Result<Vec<AuthorityId>>;

    /// Ids from `ids` with no matching secondary-auth configuration.
    async fn missing_secondaries(
        &self,
        ids: &BTreeSet<SecondaryId>,
    ) -> anyhow::Result<Vec<SecondaryId>>;
}

/// Storage backend used by the mutation pipeline.
pub trait Storage: PolicyRepository + ReferenceLookup {}

impl<T: PolicyRepository + ReferenceLookup> Storage for T {}
