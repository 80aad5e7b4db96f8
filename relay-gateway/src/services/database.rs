//! PostgreSQL Credential Store.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::store::{CredentialStore, StoreError};
use crate::models::{Identity, Policy, Role, Token};
use crate::utils::SecretHash;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::anyhow!(e))
}

/// Durable Credential Store backed by a connection pool.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    fn is_durable(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                backend(e)
            })?;
        Ok(())
    }

    // ==================== Identities ====================

    #[instrument(skip(self, identity), fields(identity_id = %identity.id))]
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO identities (id, email, display_name, created_utc, active)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(&identity.display_name)
        .bind(identity.created_utc)
        .bind(identity.active)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateEmail
            }
            _ => backend(e),
        })?;
        Ok(())
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        sqlx::query_as::<_, Identity>(
            "SELECT id, email, display_name, created_utc, active FROM identities WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    async fn find_identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        sqlx::query_as::<_, Identity>(
            "SELECT id, email, display_name, created_utc, active FROM identities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    #[instrument(skip(self))]
    async fn set_identity_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE identities SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Identity".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, hash))]
    async fn set_credential(&self, identity_id: Uuid, hash: &SecretHash) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO credentials (identity_id, secret_hash, updated_utc)
            VALUES ($1, $2, NOW())
            ON CONFLICT (identity_id)
            DO UPDATE SET secret_hash = EXCLUDED.secret_hash, updated_utc = NOW()
            "#,
        )
        .bind(identity_id)
        .bind(hash.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                StoreError::NotFound("Identity".to_string())
            }
            _ => backend(e),
        })?;
        Ok(())
    }

    async fn credential_hash(&self, identity_id: Uuid) -> Result<Option<SecretHash>, StoreError> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT secret_hash FROM credentials WHERE identity_id = $1")
                .bind(identity_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(hash.map(SecretHash::new))
    }

    // ==================== Roles ====================

    async fn ensure_role(&self, name: &str) -> Result<Role, StoreError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (role_id, role_name, created_utc)
            VALUES ($1, $2, NOW())
            ON CONFLICT (role_name) DO UPDATE SET role_name = EXCLUDED.role_name
            RETURNING role_id, role_name, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    #[instrument(skip(self))]
    async fn assign_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO role_assignments (identity_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(identity_id)
        .bind(role_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                StoreError::NotFound("Identity or role".to_string())
            }
            _ => backend(e),
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unassign_role(&self, identity_id: Uuid, role_name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_assignments ra
            USING roles r
            WHERE ra.role_id = r.role_id AND ra.identity_id = $1 AND r.role_name = $2
            "#,
        )
        .bind(identity_id)
        .bind(role_name)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn assigned_role_names(&self, identity_id: Uuid) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar(
            r#"
            SELECT r.role_name
            FROM role_assignments ra
            JOIN roles r ON r.role_id = ra.role_id
            WHERE ra.identity_id = $1
            ORDER BY r.role_name
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    // ==================== Policies ====================

    async fn list_policies(&self, subject: &str) -> Result<Vec<Policy>, StoreError> {
        sqlx::query_as::<_, Policy>(
            r#"
            SELECT policy_id, subject, action, resource, created_utc
            FROM policies
            WHERE subject = $1
            ORDER BY created_utc, policy_id
            "#,
        )
        .bind(subject)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn list_all_policies(&self) -> Result<Vec<Policy>, StoreError> {
        sqlx::query_as::<_, Policy>(
            r#"
            SELECT policy_id, subject, action, resource, created_utc
            FROM policies
            ORDER BY created_utc, policy_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    #[instrument(skip(self, policy), fields(subject = %policy.subject))]
    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO policies (policy_id, subject, action, resource, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(policy.policy_id)
        .bind(&policy.subject)
        .bind(&policy.action)
        .bind(&policy.resource)
        .bind(policy.created_utc)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn ensure_policy(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO policies (policy_id, subject, action, resource, created_utc)
            SELECT $1, $2, $3, $4, NOW()
            WHERE NOT EXISTS (
                SELECT 1 FROM policies WHERE subject = $2 AND action = $3 AND resource = $4
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subject)
        .bind(action)
        .bind(resource)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Tokens ====================

    #[instrument(skip(self, token), fields(token_id = %token.id))]
    async fn upsert_token(&self, token: &Token) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tokens (id, name, scopes, expires_at, revoked, owner_id, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                scopes = EXCLUDED.scopes,
                expires_at = EXCLUDED.expires_at,
                revoked = tokens.revoked OR EXCLUDED.revoked,
                owner_id = EXCLUDED.owner_id
            "#,
        )
        .bind(&token.id)
        .bind(&token.name)
        .bind(&token.scopes)
        .bind(token.expires_at)
        .bind(token.revoked)
        .bind(token.owner_id)
        .bind(token.created_utc)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_token(&self, id: &str) -> Result<Option<Token>, StoreError> {
        sqlx::query_as::<_, Token>(
            r#"
            SELECT id, name, scopes, expires_at, revoked, owner_id, created_utc
            FROM tokens WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError> {
        sqlx::query_as::<_, Token>(
            r#"
            SELECT id, name, scopes, expires_at, revoked, owner_id, created_utc
            FROM tokens ORDER BY created_utc, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn count_tokens(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tokens")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn store() -> PgCredentialStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.expect("connect");
        db::run_migrations(&pool).await.expect("migrations");
        PgCredentialStore::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn identity_email_is_unique() {
        let store = store().await;
        let email = format!("{}@example.com", Uuid::new_v4());
        store
            .create_identity(&Identity::new(email.clone(), None))
            .await
            .unwrap();
        let err = store
            .create_identity(&Identity::new(email, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn ensure_policy_is_idempotent() {
        let store = store().await;
        let subject = format!("role:{}", Uuid::new_v4());
        assert!(store.ensure_policy(&subject, "*", "*").await.unwrap());
        assert!(!store.ensure_policy(&subject, "*", "*").await.unwrap());
        assert_eq!(store.list_policies(&subject).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn token_round_trips_through_upsert() {
        let store = store().await;
        let mut token = Token {
            id: Token::generate_id(),
            name: "pg".into(),
            scopes: vec!["proxy:invoke".into(), "admin".into()],
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            revoked: false,
            owner_id: None,
            created_utc: chrono::Utc::now(),
        };
        store.upsert_token(&token).await.unwrap();
        token.revoked = true;
        store.upsert_token(&token).await.unwrap();

        let loaded = store.get_token(&token.id).await.unwrap().unwrap();
        assert!(loaded.revoked);
        assert_eq!(loaded.scopes, token.scopes);

        // A write from a copy read before revocation keeps the flag set.
        token.revoked = false;
        token.name = "stale".into();
        store.upsert_token(&token).await.unwrap();
        let loaded = store.get_token(&token.id).await.unwrap().unwrap();
        assert!(loaded.revoked);
        assert_eq!(loaded.name, "stale");
    }
}
