use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{AuthMode, Token};

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    #[validate(length(max = 128, message = "Token name is too long"))]
    pub name: Option<String>,

    pub scopes: Option<Vec<String>>,

    /// Hours until expiry; absent or non-positive means the default.
    pub ttl_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: Token,
    pub jwt: String,
    pub bootstrap: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUpstreamRequest {
    pub id: Option<String>,

    #[validate(url(message = "baseUrl must be an absolute URL"))]
    pub base_url: String,

    pub auth_mode: Option<AuthMode>,

    pub custom_auth_header: Option<String>,
}

/// Not `Debug`: may carry an initial password.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdentityRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub display_name: Option<String>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRoleRequest {
    #[validate(length(min = 1, message = "Role name is required"))]
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolesResponse {
    pub identity_id: uuid::Uuid,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePolicyRequest {
    #[validate(custom(function = "validate_subject"))]
    pub subject: String,

    #[validate(length(min = 1, message = "Action is required"))]
    pub action: String,

    #[validate(length(min = 1, message = "Resource is required"))]
    pub resource: String,
}

/// Subjects are `user:<id>` or `role:<name>` with a non-empty suffix.
fn validate_subject(subject: &str) -> Result<(), ValidationError> {
    let valid = ["user:", "role:"]
        .iter()
        .any(|prefix| subject.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("subject")
            .with_message("subject must be user:<id> or role:<name>".into()))
    }
}
