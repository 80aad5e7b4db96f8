use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use service_core::error::AppError;

use crate::{services::Principal, AppState};

/// Raw `Authorization` header value, if present and valid UTF-8.
pub fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Caller authenticated by a live bearer token.
///
/// Rejects with 401 when the credential is missing, malformed, expired or
/// revoked. Authorization is a separate step in the handler.
pub struct AuthPrincipal(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let principal = state
            .tokens
            .authenticate(authorization_header(&parts.headers))
            .await?;
        Ok(AuthPrincipal(principal))
    }
}

impl AuthPrincipal {
    /// Require a policy granting `action` on `resource`.
    pub async fn authorize(
        &self,
        state: &AppState,
        action: &str,
        resource: &str,
    ) -> Result<(), AppError> {
        state.policies.authorize(&self.0, action, resource).await?;
        Ok(())
    }
}
