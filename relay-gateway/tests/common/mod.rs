//! Shared harness for relay gateway integration tests.
//!
//! Builds the full router over the in-memory credential store and drives it
//! with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use relay_gateway::{
    build_router,
    config::{
        AdminSeedConfig, Environment, GatewayConfig, RateLimitConfig, RelaySettingsConfig,
        SecurityConfig, TokenConfig,
    },
    models::{Identity, Policy, Role, Token},
    seed_defaults,
    services::{CredentialStore, MemoryCredentialStore, StoreError},
    utils::SecretHash,
    AppState,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password-123";

pub fn test_config(upstream_base: &str) -> GatewayConfig {
    GatewayConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "relay-gateway-test".into(),
        service_version: "test".into(),
        log_level: "error".into(),
        otlp_endpoint: None,
        database: None,
        token: TokenConfig {
            jwt_secret: SecretString::new("integration-test-secret".into()),
            default_ttl_hours: 24,
        },
        admin: AdminSeedConfig {
            email: ADMIN_EMAIL.into(),
            password: Some(SecretString::new(ADMIN_PASSWORD.into())),
        },
        relay: RelaySettingsConfig {
            default_base_url: upstream_base.into(),
            require_auth: false,
            allowed_models: vec!["gpt-4.1".into(), "gpt-4o".into()],
            default_provider: "openai".into(),
            session_title: "Auto Session".into(),
            upstream_timeout_seconds: 5,
        },
        security: SecurityConfig {
            allowed_origins: vec!["*".into()],
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            trust_forwarded_for: false,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    /// Seeded app whose default upstream points at nothing reachable.
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config("http://127.0.0.1:9"), Arc::new(MemoryCredentialStore::new()))
            .await
    }

    pub async fn spawn_with_upstream(upstream_base: &str) -> Self {
        Self::spawn_with(test_config(upstream_base), Arc::new(MemoryCredentialStore::new())).await
    }

    pub async fn spawn_with(config: GatewayConfig, store: Arc<dyn CredentialStore>) -> Self {
        let state = AppState::new(config, store, None).expect("Failed to build app state");
        seed_defaults(&state).await;
        let router = build_router(state.clone());
        Self { state, router }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send one request and return the status and decoded JSON body
    /// (`Null` when empty).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self.send(builder.body(body).unwrap()).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    /// Use the bootstrap window and return the artifact.
    pub async fn bootstrap_jwt(&self) -> String {
        let (status, body) = self
            .request("POST", "/admin/token", None, Some(json!({ "name": "bootstrap" })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "bootstrap failed: {}", body);
        assert_eq!(body["bootstrap"], true);
        body["jwt"].as_str().unwrap().to_string()
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.request(
            "POST",
            "/admin/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn admin_jwt(&self) -> String {
        let (status, body) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "admin login failed: {}", body);
        body["jwt"].as_str().unwrap().to_string()
    }

    /// Create a plain identity through the admin API and log it in.
    pub async fn member_jwt(&self, admin_jwt: &str, email: &str) -> (String, String) {
        let (status, body) = self
            .request(
                "POST",
                "/admin/identity",
                Some(admin_jwt),
                Some(json!({ "email": email, "password": "member-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "identity create failed: {}", body);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = self.login(email, "member-password").await;
        assert_eq!(status, StatusCode::OK);
        (id, body["jwt"].as_str().unwrap().to_string())
    }
}

/// Memory store with switchable faults.
pub struct FaultyStore {
    inner: MemoryCredentialStore,
    pub fail_token_writes: bool,
    pub durable_and_down: bool,
}

impl FaultyStore {
    pub fn failing_token_writes() -> Self {
        Self {
            inner: MemoryCredentialStore::new(),
            fail_token_writes: true,
            durable_and_down: false,
        }
    }

    pub fn unreachable_database() -> Self {
        Self {
            inner: MemoryCredentialStore::new(),
            fail_token_writes: false,
            durable_and_down: true,
        }
    }
}

#[async_trait]
impl CredentialStore for FaultyStore {
    fn is_durable(&self) -> bool {
        self.durable_and_down
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.durable_and_down {
            return Err(StoreError::Backend(anyhow::anyhow!("connection refused")));
        }
        self.inner.health_check().await
    }

    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.inner.create_identity(identity).await
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        self.inner.find_identity_by_email(email).await
    }

    async fn find_identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        self.inner.find_identity_by_id(id).await
    }

    async fn set_identity_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        self.inner.set_identity_active(id, active).await
    }

    async fn set_credential(&self, identity_id: Uuid, hash: &SecretHash) -> Result<(), StoreError> {
        self.inner.set_credential(identity_id, hash).await
    }

    async fn credential_hash(&self, identity_id: Uuid) -> Result<Option<SecretHash>, StoreError> {
        self.inner.credential_hash(identity_id).await
    }

    async fn ensure_role(&self, name: &str) -> Result<Role, StoreError> {
        self.inner.ensure_role(name).await
    }

    async fn assign_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<(), StoreError> {
        self.inner.assign_role(identity_id, role_id).await
    }

    async fn unassign_role(&self, identity_id: Uuid, role_name: &str) -> Result<bool, StoreError> {
        self.inner.unassign_role(identity_id, role_name).await
    }

    async fn assigned_role_names(&self, identity_id: Uuid) -> Result<Vec<String>, StoreError> {
        self.inner.assigned_role_names(identity_id).await
    }

    async fn list_policies(&self, subject: &str) -> Result<Vec<Policy>, StoreError> {
        self.inner.list_policies(subject).await
    }

    async fn list_all_policies(&self) -> Result<Vec<Policy>, StoreError> {
        self.inner.list_all_policies().await
    }

    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.inner.insert_policy(policy).await
    }

    async fn ensure_policy(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<bool, StoreError> {
        self.inner.ensure_policy(subject, action, resource).await
    }

    async fn upsert_token(&self, token: &Token) -> Result<(), StoreError> {
        if self.fail_token_writes {
            return Err(StoreError::Backend(anyhow::anyhow!("disk full")));
        }
        self.inner.upsert_token(token).await
    }

    async fn get_token(&self, id: &str) -> Result<Option<Token>, StoreError> {
        self.inner.get_token(id).await
    }

    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError> {
        self.inner.list_tokens().await
    }

    async fn count_tokens(&self) -> Result<i64, StoreError> {
        self.inner.count_tokens().await
    }
}
