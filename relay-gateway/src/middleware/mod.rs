pub mod auth;

pub use auth::{authorization_header, AuthPrincipal};
