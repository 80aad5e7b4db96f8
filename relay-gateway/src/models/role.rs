//! Role model - named groups of identities that policies can target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Role entity. Names are unique.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub role_id: Uuid,
    pub role_name: String,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    pub fn new(role_name: String) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            role_name,
            created_utc: Utc::now(),
        }
    }
}

/// Identity to role membership. The pair is unique.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RoleAssignment {
    pub identity_id: Uuid,
    pub role_id: Uuid,
}
