//! Token Authority: issues, validates and revokes bearer tokens.
//!
//! An issued artifact is an HS256 JWT over `{tid, scopes, sub?, iat, exp}`.
//! It is only honoured while the matching store record exists, is not
//! revoked and has not expired, and while its owning identity (if any) is
//! still active.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{CredentialStore, StoreError};
use crate::models::{Token, TokenPatch, DEFAULT_SCOPE};
use crate::utils::bearer_token;

/// Signed claims carried by every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Token record id.
    pub tid: String,
    pub scopes: Vec<String>,
    /// Owning identity, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// A caller authenticated by a valid, live token.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub token_id: String,
    pub scopes: Vec<String>,
    pub identity_id: Option<Uuid>,
}

/// A persisted token together with its signed artifact.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: Token,
    pub jwt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Admin,
    Login,
    Bootstrap,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Admin => "admin",
            IssueKind::Login => "login",
            IssueKind::Bootstrap => "bootstrap",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub name: String,
    /// Empty means the default scope.
    pub scopes: Vec<String>,
    pub ttl: Duration,
    pub owner_id: Option<Uuid>,
    pub kind: IssueKind,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Credential expired")]
    Expired,

    #[error("Token revoked or unknown")]
    RevokedOrUnknown,

    #[error("Token owner is inactive or unknown")]
    InactiveOwner,

    #[error("Bootstrap window is closed")]
    BootstrapClosed,

    #[error("Token not found")]
    NotFound,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Token signed but not persisted: {source}")]
    PartialFailure {
        issued: Box<IssuedToken>,
        source: StoreError,
    },

    #[error("Failed to sign token: {0}")]
    Signing(anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingCredential
            | TokenError::InvalidCredential
            | TokenError::Expired
            | TokenError::RevokedOrUnknown
            | TokenError::InactiveOwner
            | TokenError::BootstrapClosed => AppError::Unauthorized(anyhow::anyhow!(err.to_string())),
            TokenError::NotFound => AppError::NotFound(anyhow::anyhow!("Token not found")),
            TokenError::InvalidRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            TokenError::PartialFailure { issued, source } => {
                tracing::error!(
                    token_id = %issued.token.id,
                    error = %source,
                    "Token signed but its record was not persisted"
                );
                AppError::PartialFailure {
                    message: "token signed but not persisted".to_string(),
                    issued: serde_json::to_value(&*issued).unwrap_or_default(),
                }
            }
            TokenError::Signing(e) => AppError::InternalError(e),
            TokenError::Store(e) => e.into(),
        }
    }
}

pub struct TokenAuthority {
    store: Arc<dyn CredentialStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    bootstrap: Mutex<()>,
}

impl TokenAuthority {
    pub fn new(store: Arc<dyn CredentialStore>, secret: &SecretString) -> Self {
        let key = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            store,
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            validation,
            bootstrap: Mutex::new(()),
        }
    }

    /// Sign arbitrary claims with the process secret.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(anyhow::anyhow!(e)))
    }

    /// Create, sign and persist a token.
    ///
    /// Signing happens first; a persistence failure afterwards is reported as
    /// `PartialFailure` carrying the signed artifact.
    pub async fn issue(&self, request: TokenRequest) -> Result<IssuedToken, TokenError> {
        if request.ttl <= Duration::zero() {
            return Err(TokenError::InvalidRequest(
                "ttl must be positive".to_string(),
            ));
        }

        let scopes = if request.scopes.is_empty() {
            vec![DEFAULT_SCOPE.to_string()]
        } else {
            request.scopes
        };

        let now = Utc::now();
        let token = Token {
            id: Token::generate_id(),
            name: request.name,
            scopes,
            expires_at: now + request.ttl,
            revoked: false,
            owner_id: request.owner_id,
            created_utc: now,
        };

        let claims = TokenClaims {
            tid: token.id.clone(),
            scopes: token.scopes.clone(),
            sub: token.owner_id.map(|id| id.to_string()),
            iat: now.timestamp(),
            exp: token.expires_at.timestamp(),
        };
        let jwt = self.sign(&claims)?;

        if let Err(source) = self.store.upsert_token(&token).await {
            return Err(TokenError::PartialFailure {
                issued: Box::new(IssuedToken { token, jwt }),
                source,
            });
        }

        metrics::counter!("tokens_issued_total", "kind" => request.kind.as_str()).increment(1);
        tracing::info!(
            token_id = %token.id,
            kind = request.kind.as_str(),
            owner_id = ?token.owner_id,
            "Token issued"
        );

        Ok(IssuedToken { token, jwt })
    }

    /// Issue without a presented credential, only while no token exists.
    ///
    /// Attempts are serialized so exactly one caller can use the window.
    pub async fn issue_bootstrap(
        &self,
        mut request: TokenRequest,
    ) -> Result<IssuedToken, TokenError> {
        let _guard = self.bootstrap.lock().await;

        if self.store.count_tokens().await? > 0 {
            return Err(TokenError::BootstrapClosed);
        }

        request.kind = IssueKind::Bootstrap;
        self.issue(request).await
    }

    /// True while no token has ever been stored.
    pub async fn bootstrap_open(&self) -> Result<bool, TokenError> {
        Ok(self.store.count_tokens().await? == 0)
    }

    /// Verify an artifact and its backing record.
    pub async fn validate(&self, artifact: &str) -> Result<Principal, TokenError> {
        let claims = decode::<TokenClaims>(artifact, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidCredential,
            })?
            .claims;

        let record = self
            .store
            .get_token(&claims.tid)
            .await?
            .filter(|t| !t.revoked)
            .ok_or(TokenError::RevokedOrUnknown)?;

        let now = Utc::now();
        if claims.exp <= now.timestamp() || record.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        if let Some(owner_id) = record.owner_id {
            let active = self
                .store
                .find_identity_by_id(owner_id)
                .await?
                .map_or(false, |identity| identity.active);
            if !active {
                tracing::warn!(
                    token_id = %record.id,
                    owner_id = %owner_id,
                    "Rejected token of inactive owner"
                );
                return Err(TokenError::InactiveOwner);
            }
        }

        Ok(Principal {
            token_id: record.id,
            scopes: record.scopes,
            identity_id: record.owner_id,
        })
    }

    /// Validate the bearer credential in an `Authorization` header value.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, TokenError> {
        let artifact = header
            .and_then(bearer_token)
            .ok_or(TokenError::MissingCredential)?;
        self.validate(artifact).await
    }

    /// Relay admission: validate only when `required`.
    pub async fn admit(
        &self,
        header: Option<&str>,
        required: bool,
    ) -> Result<Option<Principal>, TokenError> {
        if !required {
            return Ok(None);
        }
        self.authenticate(header).await.map(Some)
    }

    pub async fn get(&self, id: &str) -> Result<Token, TokenError> {
        self.store.get_token(id).await?.ok_or(TokenError::NotFound)
    }

    pub async fn list(&self) -> Result<Vec<Token>, TokenError> {
        Ok(self.store.list_tokens().await?)
    }

    /// Mark a token revoked. Revoking twice is not an error.
    pub async fn revoke(&self, id: &str) -> Result<Token, TokenError> {
        let mut token = self.get(id).await?;
        if token.revoked {
            return Ok(token);
        }

        token.revoked = true;
        self.store.upsert_token(&token).await?;
        tracing::info!(token_id = %token.id, "Token revoked");
        Ok(token)
    }

    /// Rename, rescope or revoke. Revocation cannot be undone.
    pub async fn update(&self, id: &str, patch: TokenPatch) -> Result<Token, TokenError> {
        let mut token = self.get(id).await?;

        if patch.revoked == Some(false) && token.revoked {
            return Err(TokenError::InvalidRequest(
                "revoked tokens cannot be reinstated".to_string(),
            ));
        }

        if let Some(name) = patch.name {
            token.name = name;
        }
        if let Some(scopes) = patch.scopes {
            if !scopes.is_empty() {
                token.scopes = scopes;
            }
        }
        if patch.revoked == Some(true) {
            token.revoked = true;
        }

        self.store.upsert_token(&token).await?;
        // Re-read: a concurrent revoke may have landed since the read above.
        let token = self.get(id).await?;
        tracing::info!(token_id = %token.id, revoked = token.revoked, "Token updated");
        Ok(token)
    }
}
