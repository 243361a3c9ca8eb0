use chrono::{DateTime, Utc};

use crate::job::JobRecord;

/// Rate read from a source page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionResult {
    pub rate: f64,
    pub created_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn now(rate: f64) -> Self {
        Self {
            rate,
            created_at: Utc::now(),
        }
    }
}

/// Record emitted downstream for every successful attempt: the job fields as
/// they stand after the attempt plus the extracted rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRecord {
    pub from: String,
    pub to: String,
    pub fail_count: u32,
    pub success_count: u32,
    pub rate: f64,
    pub created_at: DateTime<Utc>,
}

impl ExchangeRecord {
    pub fn new(job: &JobRecord, result: ExtractionResult) -> Self {
        Self {
            from: job.from.clone(),
            to: job.to.clone(),
            fail_count: job.fail_count,
            success_count: job.success_count,
            rate: result.rate,
            created_at: result.created_at,
        }
    }

    /// Rate formatted with two decimals.
    pub fn rate_text(&self) -> String {
        format!("{:.2}", self.rate)
    }
}

/// An exchange record as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredRate {
    pub id: i64,
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub created_at: DateTime<Utc>,
}
