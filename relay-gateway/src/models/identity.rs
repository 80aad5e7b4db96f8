//! Identity model - principals that can hold credentials and roles.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Identity entity. Secret material lives in the `credentials` relation.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub active: bool,
}

impl Identity {
    /// Create a new, active identity.
    pub fn new(email: String, display_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            display_name,
            created_utc: Utc::now(),
            active: true,
        }
    }
}
