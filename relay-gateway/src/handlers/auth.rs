use axum::{extract::State, Json};
use secrecy::SecretString;
use service_core::error::AppError;

use crate::{dtos::auth::LoginRequest, services::LoginOutcome, utils::ValidatedJson, AppState};

/// Exchange email and password for a persisted token owned by the identity.
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginOutcome>, AppError> {
    let outcome = state
        .identities
        .login(&req.email, &SecretString::new(req.password))
        .await?;
    Ok(Json(outcome))
}
