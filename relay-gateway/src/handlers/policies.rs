use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::admin::CreatePolicyRequest, middleware::AuthPrincipal, models::Policy,
    utils::ValidatedJson, AppState,
};

pub async fn list_policies(
    State(state): State<AppState>,
    principal: AuthPrincipal,
) -> Result<Json<Vec<Policy>>, AppError> {
    principal.authorize(&state, "policy:list", "policy").await?;
    Ok(Json(state.policies.list().await?))
}

pub async fn create_policy(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    ValidatedJson(req): ValidatedJson<CreatePolicyRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.authorize(&state, "policy:create", "policy").await?;
    let policy = state
        .policies
        .create(&req.subject, req.action.trim(), req.resource.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(policy)))
}
