use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use service_core::error::AppError;

use crate::{
    dtos::admin::{CreateTokenRequest, CreateTokenResponse},
    middleware::{authorization_header, AuthPrincipal},
    models::{Token, TokenPatch},
    services::{IssueKind, IssuedToken, TokenError, TokenRequest},
    utils::{JsonBody, ValidatedJson},
    AppState,
};

const DEFAULT_TOKEN_NAME: &str = "token";

pub async fn list_tokens(
    State(state): State<AppState>,
    principal: AuthPrincipal,
) -> Result<Json<Vec<Token>>, AppError> {
    principal.authorize(&state, "token:list", "token").await?;
    Ok(Json(state.tokens.list().await?))
}

/// Issue a token.
///
/// While no token exists the first caller is served without credentials and
/// the token is owned by the seeded admin identity. Afterwards the caller must
/// hold `token:create`, and the new token is owned by the caller's identity.
pub async fn create_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<CreateTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ttl_hours = req
        .ttl_hours
        .filter(|hours| *hours > 0)
        .unwrap_or(state.config.token.default_ttl_hours);
    let mut request = TokenRequest {
        name: req
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_NAME.to_string()),
        scopes: req.scopes.unwrap_or_default(),
        ttl: Duration::hours(ttl_hours),
        owner_id: None,
        kind: IssueKind::Admin,
    };

    if state.tokens.bootstrap_open().await? {
        let admin = state
            .identities
            .ensure_admin(&state.config.admin.email, None)
            .await?;
        let mut bootstrap = request.clone();
        bootstrap.owner_id = Some(admin.id);

        match state.tokens.issue_bootstrap(bootstrap).await {
            Ok(issued) => return Ok(created(issued, true)),
            // Another caller took the window; fall through to the gated path.
            Err(TokenError::BootstrapClosed) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let principal = state
        .tokens
        .authenticate(authorization_header(&headers))
        .await?;
    state
        .policies
        .authorize(&principal, "token:create", "token")
        .await?;

    request.owner_id = principal.identity_id;
    let issued = state.tokens.issue(request).await?;
    Ok(created(issued, false))
}

fn created(issued: IssuedToken, bootstrap: bool) -> (StatusCode, Json<CreateTokenResponse>) {
    (
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            token: issued.token,
            jwt: issued.jwt,
            bootstrap,
        }),
    )
}

pub async fn get_token(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Token>, AppError> {
    principal
        .authorize(&state, "token:read", &format!("token:{}", id))
        .await?;
    Ok(Json(state.tokens.get(&id).await?))
}

pub async fn update_token(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<TokenPatch>,
) -> Result<Json<Token>, AppError> {
    principal
        .authorize(&state, "token:update", &format!("token:{}", id))
        .await?;
    Ok(Json(state.tokens.update(&id, patch).await?))
}

pub async fn revoke_token(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Token>, AppError> {
    principal
        .authorize(&state, "token:revoke", &format!("token:{}", id))
        .await?;
    Ok(Json(state.tokens.revoke(&id).await?))
}
