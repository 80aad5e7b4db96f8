//! Policy Engine: subject resolution and allow-list evaluation.
//!
//! A subject is `user:<identity id>` or `role:<role name>`. A request is
//! allowed when any of the caller's subjects has a policy row whose action
//! and resource each match exactly or are `*`. There are no deny rules.

use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::store::{CredentialStore, StoreError};
use super::token_authority::Principal;
use crate::models::{Policy, Subject, WILDCARD};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Not allowed to {action} on {resource}")]
    Denied { action: String, resource: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Denied { .. } => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
            PolicyError::Store(e) => e.into(),
        }
    }
}

pub struct PolicyEngine {
    store: Arc<dyn CredentialStore>,
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// The identity's own subject followed by one subject per assigned role.
    ///
    /// A failed role lookup yields the self subject alone.
    pub async fn subjects_for(&self, identity_id: Uuid) -> Vec<String> {
        let mut subjects = vec![Subject::user(identity_id)];
        match self.store.assigned_role_names(identity_id).await {
            Ok(roles) => subjects.extend(roles.iter().map(|r| Subject::role(r))),
            Err(e) => {
                tracing::warn!(
                    identity_id = %identity_id,
                    error = %e,
                    "Role lookup failed; using self subject only"
                );
            }
        }
        subjects
    }

    pub async fn is_allowed(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<bool, StoreError> {
        let policies = self.store.list_policies(subject).await?;
        Ok(policies.iter().any(|p| p.grants(action, resource)))
    }

    /// Gate an operation on the principal's subjects.
    ///
    /// Tokens without an owning identity have no subjects and are denied.
    pub async fn authorize(
        &self,
        principal: &Principal,
        action: &str,
        resource: &str,
    ) -> Result<(), PolicyError> {
        if let Some(identity_id) = principal.identity_id {
            for subject in self.subjects_for(identity_id).await {
                if self.is_allowed(&subject, action, resource).await? {
                    return Ok(());
                }
            }
        }

        tracing::warn!(
            token_id = %principal.token_id,
            action,
            resource,
            "Authorization denied"
        );
        Err(PolicyError::Denied {
            action: action.to_string(),
            resource: resource.to_string(),
        })
    }

    pub async fn list(&self) -> Result<Vec<Policy>, StoreError> {
        self.store.list_all_policies().await
    }

    pub async fn create(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<Policy, StoreError> {
        let policy = Policy::new(subject.to_string(), action.to_string(), resource.to_string());
        self.store.insert_policy(&policy).await?;
        tracing::info!(
            policy_id = %policy.policy_id,
            subject = %policy.subject,
            action = %policy.action,
            resource = %policy.resource,
            "Policy created"
        );
        Ok(policy)
    }

    /// Seed `role:admin` with `*` on `*`. Returns whether a row was added.
    pub async fn seed_admin_policy(&self) -> Result<bool, StoreError> {
        self.store
            .ensure_policy(&Subject::role(ADMIN_ROLE), WILDCARD, WILDCARD)
            .await
    }
}
