use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    middleware::AuthPrincipal,
    models::{RelayConfig, RelayConfigPatch},
    utils::JsonBody,
    AppState,
};

pub async fn get_config(
    State(state): State<AppState>,
    principal: AuthPrincipal,
) -> Result<Json<RelayConfig>, AppError> {
    principal.authorize(&state, "config:read", "config").await?;
    Ok(Json(state.settings.snapshot()?))
}

pub async fn patch_config(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    JsonBody(patch): JsonBody<RelayConfigPatch>,
) -> Result<Json<RelayConfig>, AppError> {
    principal.authorize(&state, "config:write", "config").await?;
    let config = state.settings.apply(patch)?;
    tracing::info!(
        default_upstream = %config.default_upstream,
        require_auth = config.require_auth,
        allowed_models = ?config.allowed_models,
        "Relay config updated"
    );
    Ok(Json(config))
}
