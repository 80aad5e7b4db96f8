//! Storage selection: PostgreSQL when configured, in-memory otherwise.

use crate::config::DatabaseConfig;
use crate::services::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await?;

    tracing::info!("Successfully connected to PostgreSQL");

    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Open the Credential Store for this process.
///
/// Without a database the store lives in memory and is lost on restart.
pub async fn open_store(
    config: Option<&DatabaseConfig>,
) -> Result<Arc<dyn CredentialStore>, AppError> {
    match config {
        Some(config) => {
            let pool = create_pool(config)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
            run_migrations(&pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
            Ok(Arc::new(PgCredentialStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory credential store");
            Ok(Arc::new(MemoryCredentialStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_database_means_memory_store() {
        let store = open_store(None).await.unwrap();
        assert!(!store.is_durable());
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_create_pool() {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/relay_test".to_string()),
            max_connections: 5,
            min_connections: 1,
        };

        let result = create_pool(&config).await;
        assert!(result.is_ok());
    }
}
