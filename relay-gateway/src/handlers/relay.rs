use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use service_core::error::AppError;

use crate::{middleware::authorization_header, services::RelayResult, AppState};

/// Relay one chat request to the configured upstream.
///
/// The body is handed over raw so admission runs before it is decoded.
pub async fn auto_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RelayResult>, AppError> {
    let result = state
        .relay
        .relay(&body, authorization_header(&headers))
        .await?;
    Ok(Json(result))
}

pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn method_not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Permissive CORS on every relay response, errors included.
pub async fn relay_cors_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );

    response
}
