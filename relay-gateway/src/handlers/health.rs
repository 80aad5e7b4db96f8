use axum::{extract::State, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::AppState;

/// Liveness plus a ping of the durable store when one is configured.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let durable = state.store.is_durable();
    if durable {
        state.store.health_check().await.map_err(|e| {
            tracing::error!(error = %e, "Credential store health check failed");
            AppError::ServiceUnavailable("credential store unavailable".to_string())
        })?;
    }

    Ok(Json(json!({
        "status": "ok",
        "db": durable,
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
