//! Token model - revocable records backing every issued bearer artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Scope granted when the issuer supplies none.
pub const DEFAULT_SCOPE: &str = "proxy:invoke";

/// Token record. Once `revoked` is set it is never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    pub name: String,
    pub scopes: Vec<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl Token {
    /// Generate a fresh, prefixed token id.
    pub fn generate_id() -> String {
        format!("tok_{}", Uuid::new_v4().simple())
    }

    /// True once the wall clock has reached `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Partial update applied by token administration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenPatch {
    pub name: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub revoked: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(expires_at: DateTime<Utc>) -> Token {
        Token {
            id: Token::generate_id(),
            name: "ci".to_string(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
            expires_at,
            revoked: false,
            owner_id: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = Token::generate_id();
        let b = Token::generate_id();
        assert!(a.starts_with("tok_"));
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        assert!(token(now).is_expired_at(now));
        assert!(!token(now + Duration::seconds(1)).is_expired_at(now));
    }

    #[test]
    fn serializes_expiry_as_unix_seconds() {
        let t = token(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["expiresAt"], 1_700_000_000);
        assert!(json.get("ownerId").is_none());
    }
}
