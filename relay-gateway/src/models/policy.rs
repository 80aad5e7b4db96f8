//! Policy model - allow-only grants of `action` on `resource` to a subject.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Matches any action or any resource.
pub const WILDCARD: &str = "*";

/// Policy row. Evaluation is existence-only: any matching row grants.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub policy_id: Uuid,
    pub subject: String,
    pub action: String,
    pub resource: String,
    pub created_utc: DateTime<Utc>,
}

impl Policy {
    pub fn new(subject: String, action: String, resource: String) -> Self {
        Self {
            policy_id: Uuid::new_v4(),
            subject,
            action,
            resource,
            created_utc: Utc::now(),
        }
    }

    /// True when this row grants `action` on `resource`.
    ///
    /// The subject is not compared here; rows are already selected by subject.
    pub fn grants(&self, action: &str, resource: &str) -> bool {
        (self.action == action || self.action == WILDCARD)
            && (self.resource == resource || self.resource == WILDCARD)
    }
}

/// Subject selector strings: `user:<id>` and `role:<name>`.
pub struct Subject;

impl Subject {
    pub fn user(identity_id: Uuid) -> String {
        format!("user:{}", identity_id)
    }

    pub fn role(role_name: &str) -> String {
        format!("role:{}", role_name)
    }
}
