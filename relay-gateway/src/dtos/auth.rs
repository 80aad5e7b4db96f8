use serde::Deserialize;
use validator::Validate;

/// Password login. Not `Debug`, so the secret cannot end up in a log line.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}
