use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use tokio::time::Instant;

use xrate_core::error::AppError;
use xrate_core::queue::{BuriedEntry, QueueHandle, QueueTransport, Reservation};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// PostgreSQL-backed work queue for one tube, claimed with
/// `SELECT FOR UPDATE SKIP LOCKED`.
///
/// A reservation is a row in state `reserved` with `reserved_until` set to
/// now plus the entry's time-to-run. Once that passes, the row is claimable
/// again as if it were ready, and `delete`/`bury` from the old holder are
/// refused with `NOT_FOUND`.
#[derive(Clone)]
pub struct PgQueueTransport {
    pool: Pool<Postgres>,
    tube: String,
    poll_interval: Duration,
}

impl PgQueueTransport {
    pub fn new(pool: PgPool, tube: impl Into<String>) -> Self {
        Self {
            pool,
            tube: tube.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How often `reserve` re-checks an empty tube while waiting.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn tube(&self) -> &str {
        &self.tube
    }

    async fn try_reserve(&self) -> Result<Option<Reservation>, AppError> {
        let row = sqlx::query_as::<_, ReservedRow>(
            r#"
            UPDATE queue_jobs
            SET state = 'reserved',
                reserved_until = NOW() + ttr_ms * INTERVAL '1 millisecond'
            WHERE id = (
                SELECT id FROM queue_jobs
                WHERE tube = $1
                  AND ((state = 'ready' AND visible_at <= NOW())
                    OR (state = 'reserved' AND reserved_until < NOW()))
                ORDER BY priority ASC, visible_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, payload
            "#,
        )
        .bind(&self.tube)
        .fetch_optional(&self.pool)
        .await
        .map_err(transport_error)?;

        Ok(row.map(Into::into))
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ReservedRow {
    id: i64,
    payload: Vec<u8>,
}

impl From<ReservedRow> for Reservation {
    fn from(row: ReservedRow) -> Self {
        Reservation {
            handle: QueueHandle(row.id),
            payload: row.payload,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BuriedRow {
    id: i64,
    payload: Vec<u8>,
    priority: i32,
    buried_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<BuriedRow> for BuriedEntry {
    fn from(row: BuriedRow) -> Self {
        BuriedEntry {
            handle: QueueHandle(row.id),
            payload: row.payload,
            priority: row.priority.max(0) as u32,
            buried_at: row.buried_at.unwrap_or(row.created_at),
        }
    }
}

fn transport_error(e: sqlx::Error) -> AppError {
    AppError::Transport(e.to_string())
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn not_found(handle: QueueHandle) -> AppError {
    AppError::Transport(format!("NOT_FOUND: queue entry {handle}"))
}

impl QueueTransport for PgQueueTransport {
    async fn reserve(&self, timeout: Duration) -> Result<Option<Reservation>, AppError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(reservation) = self.try_reserve().await? {
                return Ok(Some(reservation));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep((deadline - now).min(self.poll_interval)).await;
        }
    }

    async fn put(
        &self,
        payload: &[u8],
        priority: u32,
        delay: Duration,
        ttr: Duration,
    ) -> Result<QueueHandle, AppError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO queue_jobs (tube, payload, priority, visible_at, ttr_ms)
            VALUES ($1, $2, $3, NOW() + $4 * INTERVAL '1 millisecond', $5)
            RETURNING id
            "#,
        )
        .bind(&self.tube)
        .bind(payload)
        .bind(i32::try_from(priority).unwrap_or(i32::MAX))
        .bind(millis(delay))
        .bind(millis(ttr))
        .fetch_one(&self.pool)
        .await
        .map_err(transport_error)?;

        Ok(QueueHandle(row.0))
    }

    async fn delete(&self, handle: QueueHandle) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue_jobs
            WHERE id = $1 AND tube = $2
              AND state = 'reserved' AND reserved_until >= NOW()
            "#,
        )
        .bind(handle.0)
        .bind(&self.tube)
        .execute(&self.pool)
        .await
        .map_err(transport_error)?;

        if result.rows_affected() == 0 {
            return Err(not_found(handle));
        }
        Ok(())
    }

    async fn bury(&self, handle: QueueHandle, priority: u32) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET state = 'buried', priority = $3, buried_at = NOW(), reserved_until = NULL
            WHERE id = $1 AND tube = $2
              AND state = 'reserved' AND reserved_until >= NOW()
            "#,
        )
        .bind(handle.0)
        .bind(&self.tube)
        .bind(i32::try_from(priority).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .map_err(transport_error)?;

        if result.rows_affected() == 0 {
            return Err(not_found(handle));
        }
        Ok(())
    }

    async fn kick(&self, bound: u64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET state = 'ready', visible_at = NOW(), buried_at = NULL
            WHERE id IN (
                SELECT id FROM queue_jobs
                WHERE tube = $1 AND state = 'buried'
                ORDER BY buried_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $2
            )
            "#,
        )
        .bind(&self.tube)
        .bind(i64::try_from(bound).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(transport_error)?;

        Ok(result.rows_affected())
    }

    async fn list_buried(&self, limit: usize) -> Result<Vec<BuriedEntry>, AppError> {
        let rows = sqlx::query_as::<_, BuriedRow>(
            r#"
            SELECT id, payload, priority, buried_at, created_at
            FROM queue_jobs
            WHERE tube = $1 AND state = 'buried'
            ORDER BY buried_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(&self.tube)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(transport_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
