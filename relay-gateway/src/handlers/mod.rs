//! HTTP handlers for the relay gateway.

pub mod auth;
pub mod config;
pub mod health;
pub mod identities;
pub mod metrics;
pub mod policies;
pub mod relay;
pub mod tokens;
pub mod upstreams;
