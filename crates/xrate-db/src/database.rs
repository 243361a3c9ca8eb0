use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use xrate_core::AppError;

use crate::config::DatabaseConfig;
use crate::queue_repository::PgQueueTransport;
use crate::rate_repository::RateRepository;

/// Shared pool behind every tube's queue transport and the rate store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Validate `config`, connect and bring the schema up to date.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, AppError> {
        config.validate()?;
        let db = Self::connect(config).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        tracing::info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections(),
            "Connecting to database"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to connect to {}: {e}",
                    config.redacted_url()
                ))
            })?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))
    }

    pub fn queue(&self, tube: &str) -> PgQueueTransport {
        PgQueueTransport::new(self.pool.clone(), tube)
    }

    pub fn rate_repo(&self) -> RateRepository {
        RateRepository::new(self.pool.clone())
    }
}
