// src/storage/memory.rs
use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::{AuthorityId, FieldSet, Policy, PolicyId, SecondaryId, ServiceId};

use super::traits::{PolicyRepository, ReferenceLookup};

/// In-memory storage.
///
/// Used by tests and by the server when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    policies: Mutex<Vec<Policy>>,
    services: Mutex<HashSet<ServiceId>>,
    authorities: Mutex<HashSet<AuthorityId>>,
    secondaries: Mutex<HashSet<SecondaryId>>,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service that policies may reference.
    pub fn add_service(&self) -> ServiceId {
        let id = ServiceId::new();
        self.services.lock().insert(id);
        id
    }

    /// Register an authority that policies may reference.
    pub fn add_authority(&self) -> AuthorityId {
        let id = AuthorityId::new();
        self.authorities.lock().insert(id);
        id
    }

    /// Register a secondary-auth configuration that policies may reference.
    pub fn add_secondary(&self) -> SecondaryId {
        let id = SecondaryId::new();
        self.secondaries.lock().insert(id);
        id
    }

    /// Make every subsequent call fail as if the backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored policies (for assertions).
    pub fn len(&self) -> usize {
        self.policies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.lock().is_empty()
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("storage unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyRepository for MemoryStorage {
    async fn insert(&self, policy: &Policy) -> anyhow::Result<PolicyId> {
        self.check_available()?;

        let id = PolicyId::new();
        let mut stored = policy.clone();
        stored.id = id;
        self.policies.lock().push(stored);

        Ok(id)
    }

    async fn get(&self, id: PolicyId) -> anyhow::Result<Option<Policy>> {
        self.check_available()?;
        Ok(self.policies.lock().iter().find(|p| p.id == id).cloned())
    }

    async fn get_all(&self) -> anyhow::Result<Vec<Policy>> {
        self.check_available()?;
        Ok(self.policies.lock().clone())
    }

    async fn replace(
        &self,
        id: PolicyId,
        policy: &Policy,
        fields: &FieldSet,
    ) -> anyhow::Result<()> {
        self.check_available()?;

        let mut policies = self.policies.lock();
        let Some(stored) = policies.iter_mut().find(|p| p.id == id) else {
            bail!("policy {} not found", id);
        };
        stored.apply_fields(policy, fields);

        Ok(())
    }

    async fn remove(&self, id: PolicyId) -> anyhow::Result<bool> {
        self.check_available()?;

        let mut policies = self.policies.lock();
        let before = policies.len();
        policies.retain(|p| p.id != id);

        Ok(policies.len() != before)
    }
}

#[async_trait]
impl ReferenceLookup for MemoryStorage {
    async fn missing_services(&self, ids: &BTreeSet<ServiceId>) -> anyhow::Result<Vec<ServiceId>> {
        self.check_available()?;
        let known = self.services.lock();
        Ok(ids.iter().filter(|id| !known.contains(id)).copied().collect())
    }

    async fn missing_authorities(
        &self,
        ids: &BTreeSet<AuthorityId>,
    ) -> anyhow::Result<Vec<AuthorityId>> {
        self.check_available()?;
        let known = self.authorities.lock();
        Ok(ids.iter().filter(|id| !known.contains(id)).copied().collect())
    }

    async fn missing_secondaries(
        &self,
        ids: &BTreeSet<SecondaryId>,
    ) -> anyhow::Result<Vec<SecondaryId>> {
        self.check_available()?;
        let known = self.secondaries.lock();
        Ok(ids.iter().filter(|id| !known.contains(id)).copied().collect())
    }
}
