use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::{PgPool, Pool, Postgres};

use xrate_core::error::AppError;
use xrate_core::models::{ExchangeRecord, StoredRate};
use xrate_core::traits::PersistenceSink;

/// Repository for extracted exchange rates in PostgreSQL.
#[derive(Clone)]
pub struct RateRepository {
    pool: Pool<Postgres>,
}

impl RateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent rates for a currency pair, newest first.
    pub async fn history(
        &self,
        from: &str,
        to: &str,
        limit: i64,
    ) -> Result<Vec<StoredRate>, AppError> {
        let rows = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT id, from_currency, to_currency, rate, created_at
            FROM exchange_rates
            WHERE from_currency = $1 AND to_currency = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

impl PersistenceSink for RateRepository {
    async fn insert(&self, record: &ExchangeRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_rates (from_currency, to_currency, rate, fail_count, success_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.from)
        .bind(&record.to)
        .bind(record.rate)
        .bind(i32::try_from(record.fail_count).unwrap_or(i32::MAX))
        .bind(i32::try_from(record.success_count).unwrap_or(i32::MAX))
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

/// Constraint violations are permanent; anything else may be an outage.
fn store_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if !matches!(db.kind(), ErrorKind::Other) => {
            AppError::Rejected(db.to_string())
        }
        _ => AppError::DatabaseError(e.to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct RateRow {
    id: i64,
    from_currency: String,
    to_currency: String,
    rate: f64,
    created_at: DateTime<Utc>,
}

impl From<RateRow> for StoredRate {
    fn from(row: RateRow) -> Self {
        StoredRate {
            id: row.id,
            from: row.from_currency,
            to: row.to_currency,
            rate: row.rate,
            created_at: row.created_at,
        }
    }
}
