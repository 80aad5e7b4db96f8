//! Identity administration and password login.

use chrono::Duration;
use secrecy::SecretString;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::policy::ADMIN_ROLE;
use super::store::{CredentialStore, StoreError};
use super::token_authority::{IssueKind, TokenAuthority, TokenError, TokenRequest};
use crate::models::{Identity, Token, DEFAULT_SCOPE};
use crate::utils::{hash_secret, SecretHash};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("Failed to hash secret: {0}")]
    Hash(anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("invalid credentials"))
            }
            IdentityError::Hash(e) => AppError::InternalError(e),
            IdentityError::Store(e) => e.into(),
            IdentityError::Token(e) => e.into(),
        }
    }
}

/// Successful login: a persisted token owned by the identity.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub jwt: String,
    pub token: Token,
    pub user: Identity,
}

pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenAuthority>,
    login_ttl: Duration,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenAuthority>,
        login_ttl: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            login_ttl,
        }
    }

    /// Verify email and secret, then issue a token owned by the identity.
    ///
    /// Unknown email, inactive identity and wrong secret are indistinguishable.
    pub async fn login(
        &self,
        email: &str,
        secret: &SecretString,
    ) -> Result<LoginOutcome, IdentityError> {
        let identity = self
            .store
            .find_identity_by_email(email.trim())
            .await?
            .filter(|i| i.active)
            .ok_or(IdentityError::InvalidCredentials)?;

        if !self.store.verify_credential(identity.id, secret).await? {
            tracing::warn!(identity_id = %identity.id, "Login rejected");
            return Err(IdentityError::InvalidCredentials);
        }

        let issued = self
            .tokens
            .issue(TokenRequest {
                name: format!("login:{}", identity.email),
                scopes: vec![DEFAULT_SCOPE.to_string()],
                ttl: self.login_ttl,
                owner_id: Some(identity.id),
                kind: IssueKind::Login,
            })
            .await?;

        tracing::info!(identity_id = %identity.id, token_id = %issued.token.id, "Login succeeded");

        Ok(LoginOutcome {
            jwt: issued.jwt,
            token: issued.token,
            user: identity,
        })
    }

    pub async fn create_identity(
        &self,
        email: &str,
        display_name: Option<String>,
        secret: Option<SecretString>,
    ) -> Result<Identity, IdentityError> {
        let identity = Identity::new(email.trim().to_string(), display_name);
        self.store.create_identity(&identity).await?;

        if let Some(secret) = secret {
            self.set_secret(identity.id, secret).await?;
        }

        tracing::info!(identity_id = %identity.id, "Identity created");
        Ok(identity)
    }

    pub async fn set_secret(
        &self,
        identity_id: Uuid,
        secret: SecretString,
    ) -> Result<(), IdentityError> {
        let hash: SecretHash = tokio::task::spawn_blocking(move || hash_secret(&secret))
            .await
            .map_err(|e| IdentityError::Hash(anyhow::anyhow!(e)))?
            .map_err(IdentityError::Hash)?;
        self.store.set_credential(identity_id, &hash).await?;
        Ok(())
    }

    pub async fn deactivate(&self, identity_id: Uuid) -> Result<Identity, IdentityError> {
        self.store.set_identity_active(identity_id, false).await?;
        tracing::info!(identity_id = %identity_id, "Identity deactivated");
        self.store
            .find_identity_by_id(identity_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Identity".to_string()).into())
    }

    /// Grant a role, creating the role on first use. Returns the identity's roles.
    pub async fn assign_role(
        &self,
        identity_id: Uuid,
        role_name: &str,
    ) -> Result<Vec<String>, IdentityError> {
        self.require_identity(identity_id).await?;
        let role = self.store.ensure_role(role_name).await?;
        self.store.assign_role(identity_id, role.role_id).await?;
        tracing::info!(identity_id = %identity_id, role = role_name, "Role assigned");
        Ok(self.store.assigned_role_names(identity_id).await?)
    }

    pub async fn unassign_role(
        &self,
        identity_id: Uuid,
        role_name: &str,
    ) -> Result<Vec<String>, IdentityError> {
        self.require_identity(identity_id).await?;
        if !self.store.unassign_role(identity_id, role_name).await? {
            return Err(StoreError::NotFound("Role assignment".to_string()).into());
        }
        tracing::info!(identity_id = %identity_id, role = role_name, "Role unassigned");
        Ok(self.store.assigned_role_names(identity_id).await?)
    }

    /// Idempotently seed the admin identity and its role membership.
    ///
    /// When `secret` is given the admin credential is set or replaced.
    pub async fn ensure_admin(
        &self,
        email: &str,
        secret: Option<SecretString>,
    ) -> Result<Identity, IdentityError> {
        let role = self.store.ensure_role(ADMIN_ROLE).await?;

        let identity = match self.store.find_identity_by_email(email).await? {
            Some(identity) => identity,
            None => {
                let identity = Identity::new(email.to_string(), Some("Admin".to_string()));
                match self.store.create_identity(&identity).await {
                    Ok(()) => identity,
                    // Another instance seeded it first.
                    Err(StoreError::DuplicateEmail) => self
                        .store
                        .find_identity_by_email(email)
                        .await?
                        .ok_or_else(|| StoreError::NotFound("Identity".to_string()))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        self.store.assign_role(identity.id, role.role_id).await?;

        if let Some(secret) = secret {
            self.set_secret(identity.id, secret).await?;
            tracing::info!(identity_id = %identity.id, "Admin credential set");
        }

        Ok(identity)
    }

    async fn require_identity(&self, identity_id: Uuid) -> Result<Identity, IdentityError> {
        Ok(self
            .store
            .find_identity_by_id(identity_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Identity".to_string()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryCredentialStore;

    fn service() -> (Arc<TokenAuthority>, IdentityService) {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let tokens = Arc::new(TokenAuthority::new(
            store.clone(),
            &SecretString::new("test-secret".into()),
        ));
        let service = IdentityService::new(store, tokens.clone(), Duration::hours(24));
        (tokens, service)
    }

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    #[tokio::test]
    async fn login_issues_owned_revocable_token() -> Result<(), anyhow::Error> {
        let (tokens, service) = service();
        let who = service
            .create_identity("dev@example.com", None, Some(secret("pw-123456")))
            .await?;

        let outcome = service.login(" dev@example.com ", &secret("pw-123456")).await?;
        assert_eq!(outcome.user.id, who.id);
        assert_eq!(outcome.token.owner_id, Some(who.id));
        assert_eq!(outcome.token.scopes, vec![DEFAULT_SCOPE.to_string()]);

        let principal = tokens.validate(&outcome.jwt).await?;
        assert_eq!(principal.identity_id, Some(who.id));

        tokens.revoke(&outcome.token.id).await?;
        assert!(tokens.validate(&outcome.jwt).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn login_failures_look_the_same() -> Result<(), anyhow::Error> {
        let (_, service) = service();
        let who = service
            .create_identity("dev@example.com", None, Some(secret("right")))
            .await?;

        let wrong = service.login("dev@example.com", &secret("wrong")).await;
        let unknown = service.login("nobody@example.com", &secret("right")).await;
        service.deactivate(who.id).await?;
        let inactive = service.login("dev@example.com", &secret("right")).await;

        for result in [wrong, unknown, inactive] {
            let err = result.unwrap_err();
            assert!(matches!(err, IdentityError::InvalidCredentials));
            assert_eq!(err.to_string(), "invalid credentials");
        }
        Ok(())
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent_and_resets_password() -> Result<(), anyhow::Error> {
        let (_, service) = service();
        let first = service
            .ensure_admin("admin@example.com", Some(secret("one")))
            .await?;
        let second = service
            .ensure_admin("admin@example.com", Some(secret("two")))
            .await?;
        assert_eq!(first.id, second.id);
        assert_eq!(first.display_name.as_deref(), Some("Admin"));

        assert!(service.login("admin@example.com", &secret("one")).await.is_err());
        assert!(service.login("admin@example.com", &secret("two")).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn role_assignment_round_trip() -> Result<(), anyhow::Error> {
        let (_, service) = service();
        let who = service.create_identity("ops@example.com", None, None).await?;

        assert_eq!(service.assign_role(who.id, "ops").await?, vec!["ops".to_string()]);
        assert!(service.unassign_role(who.id, "ops").await?.is_empty());
        assert!(matches!(
            service.unassign_role(who.id, "ops").await,
            Err(IdentityError::Store(StoreError::NotFound(_)))
        ));
        assert!(matches!(
            service.assign_role(Uuid::new_v4(), "ops").await,
            Err(IdentityError::Store(StoreError::NotFound(_)))
        ));
        Ok(())
    }
}
