use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::ExchangeRecord;
use crate::traits::PersistenceSink;

/// Exponential backoff used while the store is unreachable.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl BackoffConfig {
    /// Delay before ping number `attempt` (1-indexed): initial, 2x, 4x, ...
    /// capped at `max`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Counters reported when the publisher finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub stored: u64,
    pub dropped: u64,
}

/// Drains worker output into a [`PersistenceSink`].
///
/// A transient insert failure puts the publisher into outage mode: it pings
/// the store with exponential backoff until a ping succeeds, then retries the
/// insert once. A record that fails again, or that the store rejects
/// outright, is logged and dropped.
pub struct RecordPublisher<P: PersistenceSink> {
    sink: P,
    backoff: BackoffConfig,
}

impl<P: PersistenceSink> RecordPublisher<P> {
    pub fn new(sink: P) -> Self {
        Self {
            sink,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Consume records until every sender is gone.
    ///
    /// Cancellation only cuts an outage wait short; records still queued in
    /// the channel are drained, each getting a single insert attempt.
    pub async fn run(
        &self,
        mut records: mpsc::Receiver<ExchangeRecord>,
        cancel_token: CancellationToken,
    ) -> PublishStats {
        let mut stats = PublishStats::default();

        while let Some(record) = records.recv().await {
            tracing::info!(
                from = %record.from,
                to = %record.to,
                rate = %record.rate_text(),
                created_at = %record.created_at,
                "Exchange rate"
            );

            let stored = match self.sink.insert(&record).await {
                Ok(()) => true,
                Err(e) if e.is_retryable() => {
                    tracing::warn!(error = %e, "Insert failed, waiting for store");
                    self.wait_for_store(&cancel_token).await
                        && self.retry_insert(&record).await
                }
                Err(e) => {
                    tracing::error!(error = %e, "Store rejected record");
                    false
                }
            };

            if stored {
                stats.stored += 1;
            } else {
                stats.dropped += 1;
                tracing::error!(from = %record.from, to = %record.to, rate = record.rate, "Exchange record dropped");
            }
        }

        tracing::info!(stored = stats.stored, dropped = stats.dropped, "Publisher finished");
        stats
    }

    async fn retry_insert(&self, record: &ExchangeRecord) -> bool {
        match self.sink.insert(record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Insert failed after store recovered");
                false
            }
        }
    }

    /// Ping with backoff until the store answers. Returns false if cancelled.
    async fn wait_for_store(&self, cancel_token: &CancellationToken) -> bool {
        let mut attempt = 1;
        loop {
            if cancel_token.is_cancelled() {
                return false;
            }
            let delay = self.backoff.delay_for_attempt(attempt);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel_token.cancelled() => return false,
            }
            match self.sink.ping().await {
                Ok(()) => {
                    tracing::info!(attempt, "Store reachable again");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, next_delay_ms = self.backoff.delay_for_attempt(attempt + 1).as_millis() as u64, "Store still unreachable");
                    attempt += 1;
                }
            }
        }
    }
}
