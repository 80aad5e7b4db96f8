use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::admin::CreateUpstreamRequest,
    middleware::AuthPrincipal,
    models::{UpstreamPatch, UpstreamTarget},
    utils::{JsonBody, ValidatedJson},
    AppState,
};

pub async fn list_upstreams(
    State(state): State<AppState>,
    principal: AuthPrincipal,
) -> Result<Json<Vec<UpstreamTarget>>, AppError> {
    principal.authorize(&state, "upstream:list", "upstream").await?;
    Ok(Json(state.upstreams.list()?))
}

pub async fn create_upstream(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    ValidatedJson(req): ValidatedJson<CreateUpstreamRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal
        .authorize(&state, "upstream:create", "upstream")
        .await?;

    let id = req
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("up_{}", Uuid::new_v4().simple()));
    let mut target = UpstreamTarget::new(id, &req.base_url, req.auth_mode.unwrap_or_default());
    target.custom_auth_header = req.custom_auth_header;

    let target = state.upstreams.insert(target)?;
    tracing::info!(
        upstream_id = %target.id,
        base_url = %target.base_url,
        auth_mode = ?target.auth_mode,
        "Upstream target created"
    );
    Ok((StatusCode::CREATED, Json(target)))
}

pub async fn get_upstream(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(id): Path<String>,
) -> Result<Json<UpstreamTarget>, AppError> {
    principal
        .authorize(&state, "upstream:read", &format!("upstream:{}", id))
        .await?;
    let target = state
        .upstreams
        .get(&id)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Upstream not found")))?;
    Ok(Json(target))
}

pub async fn update_upstream(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<UpstreamPatch>,
) -> Result<Json<UpstreamTarget>, AppError> {
    principal
        .authorize(&state, "upstream:update", &format!("upstream:{}", id))
        .await?;
    let target = state.upstreams.update(&id, patch)?;
    tracing::info!(upstream_id = %target.id, enabled = target.enabled, "Upstream target updated");
    Ok(Json(target))
}

pub async fn delete_upstream(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(id): Path<String>,
) -> Result<Json<UpstreamTarget>, AppError> {
    principal
        .authorize(&state, "upstream:delete", &format!("upstream:{}", id))
        .await?;
    let target = state.upstreams.remove(&id)?;
    tracing::info!(upstream_id = %target.id, "Upstream target removed");
    Ok(Json(target))
}
