use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{FieldSet, Policy, PolicyId};
use crate::events::{Notifier, POLICY_CHANGE};
use crate::observability::{MetricsRegistry, Mutation, TimingGuard};
use crate::storage::{PolicyRepository, Storage};

use super::document::PolicyDocument;
use super::error::{PolicyError, SystemError};
use super::validator::validate;

/// Policy mutation pipeline.
///
/// Every mutating call runs decode, validate, commit and announce in that
/// order. A failure at any step ends the call without committing and
/// without announcing.
pub struct PolicyService {
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MetricsRegistry>,
}

impl PolicyService {
    pub fn new(
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        PolicyService {
            storage,
            notifier,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Create a policy from a JSON document.
    pub async fn create(&self, body: &[u8]) -> Result<Policy, PolicyError> {
        let _timer = TimingGuard::new(&self.metrics);
        let result = self.create_inner(body).await;
        self.observe("create", result)
    }

    /// Replace the mutable attributes of a policy from a JSON document.
    pub async fn update(&self, id: &str, body: &[u8]) -> Result<Policy, PolicyError> {
        let _timer = TimingGuard::new(&self.metrics);
        let result = self.update_inner(id, body).await;
        self.observe("update", result)
    }

    /// Delete a policy. Deleting an id that does not exist succeeds.
    pub async fn delete(&self, id: &str) -> Result<(), PolicyError> {
        let _timer = TimingGuard::new(&self.metrics);
        let result = self.delete_inner(id).await;
        self.observe("delete", result)
    }

    /// Fetch one policy. A missing policy is a system error.
    pub async fn get(&self, id: &str) -> Result<Policy, PolicyError> {
        let result = match parse_id(id) {
            Ok(id) => self.fetch(id).await,
            Err(e) => Err(e),
        };
        self.observe("get", result)
    }

    /// Fetch every policy in storage order.
    pub async fn list(&self) -> Result<Vec<Policy>, PolicyError> {
        let result = self.storage.get_all().await.map_err(PolicyError::from);
        self.observe("list", result)
    }

    async fn create_inner(&self, body: &[u8]) -> Result<Policy, PolicyError> {
        let mut policy = PolicyDocument::decode(body)?.into_new_policy();

        self.check(&policy).await?;

        policy.id = self.storage.insert(&policy).await?;

        self.metrics.record_mutation(Mutation::Create);
        info!(policy_id = %policy.id, name = %policy.name, "Policy created");

        self.announce().await;
        Ok(policy)
    }

    async fn update_inner(&self, id: &str, body: &[u8]) -> Result<Policy, PolicyError> {
        let id = parse_id(id)?;
        let document = PolicyDocument::decode(body)?;

        let mut policy = self.fetch(id).await?;
        document.apply_to(&mut policy);

        self.check(&policy).await?;

        let fields = FieldSet::for_update();
        self.storage.replace(id, &policy, &fields).await?;

        self.metrics.record_mutation(Mutation::Update);
        info!(policy_id = %id, fields = ?fields.names(), "Policy updated");

        self.announce().await;
        Ok(policy)
    }

    async fn delete_inner(&self, id: &str) -> Result<(), PolicyError> {
        let id = parse_id(id)?;

        let existed = self.storage.remove(id).await?;
        if !existed {
            debug!(policy_id = %id, "Policy already absent");
        }

        self.metrics.record_mutation(Mutation::Delete);
        info!(policy_id = %id, "Policy deleted");

        self.announce().await;
        Ok(())
    }

    async fn fetch(&self, id: PolicyId) -> Result<Policy, PolicyError> {
        match self.storage.get(id).await? {
            Some(policy) => Ok(policy),
            None => Err(SystemError::NotFound(id).into()),
        }
    }

    async fn check(&self, policy: &Policy) -> Result<(), PolicyError> {
        match validate(policy, self.storage.as_ref()).await? {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    /// Best-effort change announcement after a committed mutation.
    async fn announce(&self) {
        match self.notifier.publish(POLICY_CHANGE).await {
            Ok(()) => self.metrics.record_notification(true),
            Err(e) => {
                self.metrics.record_notification(false);
                warn!(topic = POLICY_CHANGE, error = %e, "Failed to publish change notification");
            }
        }
    }

    fn observe<T>(&self, op: &'static str, result: Result<T, PolicyError>) -> Result<T, PolicyError> {
        if let Err(e) = &result {
            self.metrics.record_failure(e);

            match e {
                PolicyError::BadRequest(_) => debug!(op = op, error = %e, "Rejected request"),
                PolicyError::Validation(failure) => {
                    warn!(op = op, fields = ?failure.fields(), "Policy failed validation")
                }
                PolicyError::System(_) => error!(op = op, error = %e, "Policy operation failed"),
            }
        }

        result
    }
}

fn parse_id(raw: &str) -> Result<PolicyId, PolicyError> {
    PolicyId::parse(raw).ok_or_else(|| PolicyError::BadRequest(format!("invalid policy id: {raw:?}")))
}
