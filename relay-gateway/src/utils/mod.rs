pub mod bearer;
pub mod password;
pub mod validation;

pub use bearer::bearer_token;
pub use password::{hash_secret, verify_secret, SecretHash};
pub use validation::{JsonBody, ValidatedJson};
