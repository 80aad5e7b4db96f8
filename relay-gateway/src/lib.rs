pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use chrono::Duration as ChronoDuration;
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::models::{AuthMode, RelayConfig, UpstreamTarget};
use crate::services::{
    CredentialStore, IdentityService, PolicyEngine, RelayOptions, RelayOrchestrator,
    RelaySettings, TokenAuthority, UpstreamRegistry,
};

/// Id of the upstream target registered from `OPENCODE_BASE`.
pub const DEFAULT_UPSTREAM_ID: &str = "default";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenAuthority>,
    pub policies: Arc<PolicyEngine>,
    pub identities: Arc<IdentityService>,
    pub upstreams: Arc<UpstreamRegistry>,
    pub settings: Arc<RelaySettings>,
    pub relay: Arc<RelayOrchestrator>,
    pub login_rate_limit: IpRateLimit,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire every component over `store`. The default upstream target is
    /// registered here.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn CredentialStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, AppError> {
        let tokens = Arc::new(TokenAuthority::new(store.clone(), &config.token.jwt_secret));
        let policies = Arc::new(PolicyEngine::new(store.clone()));
        let identities = Arc::new(IdentityService::new(
            store.clone(),
            tokens.clone(),
            ChronoDuration::hours(config.token.default_ttl_hours),
        ));

        let upstreams = Arc::new(UpstreamRegistry::new());
        upstreams.upsert(UpstreamTarget::new(
            DEFAULT_UPSTREAM_ID.to_string(),
            &config.relay.default_base_url,
            AuthMode::Passthrough,
        ))?;

        let settings = Arc::new(RelaySettings::new(RelayConfig {
            default_upstream: DEFAULT_UPSTREAM_ID.to_string(),
            require_auth: config.relay.require_auth,
            allowed_models: config.relay.allowed_models.clone(),
        }));

        let relay = Arc::new(RelayOrchestrator::new(
            tokens.clone(),
            upstreams.clone(),
            settings.clone(),
            RelayOptions {
                timeout: Duration::from_secs(config.relay.upstream_timeout_seconds),
                default_provider: config.relay.default_provider.clone(),
                session_title: config.relay.session_title.clone(),
            },
        )?);

        let login_rate_limit = IpRateLimit {
            limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
            trust_forwarded_for: config.rate_limit.trust_forwarded_for,
        };

        Ok(Self {
            config: Arc::new(config),
            store,
            tokens,
            policies,
            identities,
            upstreams,
            settings,
            relay,
            login_rate_limit,
            metrics,
        })
    }
}

/// Seed the admin role, identity and wildcard policy.
///
/// Every step is idempotent. Failures are logged and startup continues.
pub async fn seed_defaults(state: &AppState) {
    match state
        .identities
        .ensure_admin(&state.config.admin.email, state.config.admin.password.clone())
        .await
    {
        Ok(admin) => tracing::info!(identity_id = %admin.id, "Admin identity ready"),
        Err(e) => tracing::error!(error = %e, "Failed to seed admin identity"),
    }

    match state.policies.seed_admin_policy().await {
        Ok(true) => tracing::info!("Seeded admin wildcard policy"),
        Ok(false) => tracing::debug!("Admin wildcard policy already present"),
        Err(e) => tracing::error!(error = %e, "Failed to seed admin policy"),
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed_origins.iter().filter_map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/admin/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limit.clone(),
            ip_rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .route("/admin/health", get(handlers::health::health_check))
        .route(
            "/admin/config",
            get(handlers::config::get_config).patch(handlers::config::patch_config),
        )
        .route(
            "/admin/token",
            get(handlers::tokens::list_tokens).post(handlers::tokens::create_token),
        )
        .route(
            "/admin/token/:id",
            get(handlers::tokens::get_token)
                .patch(handlers::tokens::update_token)
                .delete(handlers::tokens::revoke_token),
        )
        .route(
            "/admin/upstream",
            get(handlers::upstreams::list_upstreams).post(handlers::upstreams::create_upstream),
        )
        .route(
            "/admin/upstream/:id",
            get(handlers::upstreams::get_upstream)
                .patch(handlers::upstreams::update_upstream)
                .delete(handlers::upstreams::delete_upstream),
        )
        .route("/admin/identity", post(handlers::identities::create_identity))
        .route(
            "/admin/identity/:id/deactivate",
            post(handlers::identities::deactivate_identity),
        )
        .route(
            "/admin/identity/:id/roles",
            post(handlers::identities::assign_role),
        )
        .route(
            "/admin/identity/:id/roles/:role",
            delete(handlers::identities::unassign_role),
        )
        .route(
            "/admin/policy",
            get(handlers::policies::list_policies).post(handlers::policies::create_policy),
        )
        .merge(login_route)
        .layer(cors_layer(&state.config.security.allowed_origins));

    let relay_routes = Router::new()
        .route(
            "/proxy/auto-chat",
            post(handlers::relay::auto_chat)
                .options(handlers::relay::preflight)
                .fallback(handlers::relay::method_not_found),
        )
        .layer(from_fn(handlers::relay::relay_cors_headers));

    Router::new()
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(admin_routes)
        .merge(relay_routes)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}
