//! Credential Store boundary.
//!
//! Durable records for identities, credentials, roles, policies and tokens.
//! No logic lives here beyond persistence and lookup; `PgCredentialStore` is
//! the durable implementation and `MemoryCredentialStore` the fallback used
//! when no database is configured.

use async_trait::async_trait;
use secrecy::SecretString;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Identity, Policy, Role, Token};
use crate::utils::{verify_secret, SecretHash};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            StoreError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            StoreError::Backend(e) => AppError::DatabaseError(e),
        }
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether records survive a restart.
    fn is_durable(&self) -> bool;

    async fn health_check(&self) -> Result<(), StoreError>;

    // ==================== Identities ====================

    /// Insert a new identity. Fails with `DuplicateEmail` if the email exists.
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    async fn set_identity_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;

    /// Create or replace the identity's single credential row.
    async fn set_credential(&self, identity_id: Uuid, hash: &SecretHash) -> Result<(), StoreError>;

    async fn credential_hash(&self, identity_id: Uuid) -> Result<Option<SecretHash>, StoreError>;

    /// Check `secret` against the identity's stored credential.
    ///
    /// Identities without a credential never verify.
    async fn verify_credential(
        &self,
        identity_id: Uuid,
        secret: &SecretString,
    ) -> Result<bool, StoreError> {
        let Some(hash) = self.credential_hash(identity_id).await? else {
            return Ok(false);
        };
        let secret = secret.clone();
        tokio::task::spawn_blocking(move || verify_secret(&secret, &hash))
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!(e)))
    }

    // ==================== Roles ====================

    /// Return the role named `name`, creating it if absent.
    async fn ensure_role(&self, name: &str) -> Result<Role, StoreError>;

    /// Idempotent: assigning an existing membership is a no-op.
    async fn assign_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<(), StoreError>;

    /// Returns whether a membership was removed.
    async fn unassign_role(&self, identity_id: Uuid, role_name: &str) -> Result<bool, StoreError>;

    /// Names of the roles assigned to an identity, sorted.
    async fn assigned_role_names(&self, identity_id: Uuid) -> Result<Vec<String>, StoreError>;

    // ==================== Policies ====================

    /// Policies whose subject equals `subject`, in insertion order.
    async fn list_policies(&self, subject: &str) -> Result<Vec<Policy>, StoreError>;

    async fn list_all_policies(&self) -> Result<Vec<Policy>, StoreError>;

    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError>;

    /// Insert the triple unless an identical row exists. Returns whether a
    /// row was inserted.
    async fn ensure_policy(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<bool, StoreError>;

    // ==================== Tokens ====================

    /// Insert or replace a token record. Revocation is sticky: a stored
    /// `revoked = true` survives any later write.
    async fn upsert_token(&self, token: &Token) -> Result<(), StoreError>;

    async fn get_token(&self, id: &str) -> Result<Option<Token>, StoreError>;

    /// All tokens, oldest first.
    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError>;

    async fn count_tokens(&self) -> Result<i64, StoreError>;
}
