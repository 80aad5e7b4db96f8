use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::admin::{AssignRoleRequest, CreateIdentityRequest, RolesResponse},
    middleware::AuthPrincipal,
    models::Identity,
    utils::ValidatedJson,
    AppState,
};

pub async fn create_identity(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    ValidatedJson(req): ValidatedJson<CreateIdentityRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal
        .authorize(&state, "identity:create", "identity")
        .await?;
    let identity = state
        .identities
        .create_identity(
            &req.email,
            req.display_name,
            req.password.map(SecretString::new),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

pub async fn deactivate_identity(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Identity>, AppError> {
    principal
        .authorize(&state, "identity:update", &format!("identity:{}", id))
        .await?;
    Ok(Json(state.identities.deactivate(id).await?))
}

pub async fn assign_role(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AssignRoleRequest>,
) -> Result<Json<RolesResponse>, AppError> {
    principal
        .authorize(&state, "role:assign", &format!("identity:{}", id))
        .await?;
    let roles = state.identities.assign_role(id, req.role.trim()).await?;
    Ok(Json(RolesResponse {
        identity_id: id,
        roles,
    }))
}

pub async fn unassign_role(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path((id, role)): Path<(Uuid, String)>,
) -> Result<Json<RolesResponse>, AppError> {
    principal
        .authorize(&state, "role:unassign", &format!("identity:{}", id))
        .await?;
    let roles = state.identities.unassign_role(id, &role).await?;
    Ok(Json(RolesResponse {
        identity_id: id,
        roles,
    }))
}
