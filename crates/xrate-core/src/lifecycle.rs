//! Per-job queue policy: what happens to a reserved job after an attempt.
//!
//! ```text
//! failure: fail_count == fail_limit       -> bury
//!          otherwise                      -> requeue after delay_on_failure
//! success: success_count == success_limit -> delete
//!          otherwise                      -> requeue after delay_on_success
//! ```
//!
//! Limits are compared with `==`. A counter that is already past its limit
//! when the job is reserved (edited by hand, or produced with preset counters)
//! never matches again and the job keeps cycling.
//!
//! Requeue is delete-then-put and therefore at-most-once: if the put fails
//! after the delete went through, the job is gone. This surfaces as
//! [`AppError::JobLost`] and an error log line; nothing tries to restore it.

use std::fmt;
use std::time::Duration;

use crate::error::AppError;
use crate::job::{JobRecord, LifecyclePolicy, Outcome};
use crate::models::{ExchangeRecord, ExtractionResult};
use crate::queue::{QueueHandle, QueueTransport};

/// A decoded job together with the reservation that holds it.
#[derive(Debug, Clone)]
pub struct ReservedJob {
    pub handle: QueueHandle,
    pub job: JobRecord,
}

/// Queue action chosen for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Bury,
    Delete,
    Requeue(Duration),
}

/// What was done to a job's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Buried,
    Deleted,
    Requeued { handle: QueueHandle, delay: Duration },
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Buried => write!(f, "buried"),
            Resolution::Deleted => write!(f, "deleted"),
            Resolution::Requeued { handle, delay } => {
                write!(f, "requeued as {handle} after {}ms", delay.as_millis())
            }
        }
    }
}

/// Wraps a [`QueueTransport`] with the retry/bury/delete policy.
#[derive(Clone)]
pub struct JobLifecycleManager<Q: QueueTransport> {
    queue: Q,
    policy: LifecyclePolicy,
}

impl<Q: QueueTransport> JobLifecycleManager<Q> {
    pub fn new(queue: Q, policy: LifecyclePolicy) -> Self {
        Self { queue, policy }
    }

    /// Put a fresh job on the queue, visible immediately.
    pub async fn enqueue(&self, job: &JobRecord) -> Result<QueueHandle, AppError> {
        let payload = job.encode()?;
        self.queue
            .put(&payload, self.policy.priority, Duration::ZERO, self.policy.ttr)
            .await
    }

    /// Reserve and decode the next job.
    ///
    /// An entry whose payload cannot be decoded is buried, since it can
    /// never be requeued safely, and the decode error is returned.
    pub async fn reserve(&self, timeout: Duration) -> Result<Option<ReservedJob>, AppError> {
        let Some(reservation) = self.queue.reserve(timeout).await? else {
            return Ok(None);
        };

        match JobRecord::decode(&reservation.payload) {
            Ok(job) => Ok(Some(ReservedJob {
                handle: reservation.handle,
                job,
            })),
            Err(e) => {
                tracing::error!(
                    handle = %reservation.handle,
                    error = %e,
                    "Undecodable job payload, burying"
                );
                if let Err(bury_err) = self
                    .queue
                    .bury(reservation.handle, self.policy.priority)
                    .await
                {
                    tracing::error!(
                        handle = %reservation.handle,
                        error = %bury_err,
                        "Failed to bury undecodable job"
                    );
                }
                Err(e)
            }
        }
    }

    /// Count a failed attempt against the job.
    pub fn record_failure(&self, reserved: &mut ReservedJob) {
        reserved.job.fail();
    }

    /// Count a successful attempt and build the record to emit downstream.
    pub fn record_success(
        &self,
        reserved: &mut ReservedJob,
        result: ExtractionResult,
    ) -> ExchangeRecord {
        reserved.job.succeed();
        ExchangeRecord::new(&reserved.job, result)
    }

    /// Decide the queue action for a job from its counters and last outcome.
    ///
    /// A job with no recorded attempt goes straight back to the queue.
    pub fn decide(&self, job: &JobRecord) -> Action {
        match job.last_outcome {
            Outcome::Failure if job.fail_count == self.policy.fail_limit => Action::Bury,
            Outcome::Failure => Action::Requeue(self.policy.delay_on_failure),
            Outcome::Success if job.success_count == self.policy.success_limit => Action::Delete,
            Outcome::Success => Action::Requeue(self.policy.delay_on_success),
            Outcome::Unknown => Action::Requeue(Duration::ZERO),
        }
    }

    /// Apply the decided action, ending the reservation.
    pub async fn settle(&self, reserved: ReservedJob) -> Result<Resolution, AppError> {
        match self.decide(&reserved.job) {
            Action::Bury => {
                self.queue
                    .bury(reserved.handle, self.policy.priority)
                    .await?;
                Ok(Resolution::Buried)
            }
            Action::Delete => {
                self.queue.delete(reserved.handle).await?;
                Ok(Resolution::Deleted)
            }
            Action::Requeue(delay) => {
                let handle = self.requeue(reserved.handle, &reserved.job, delay).await?;
                Ok(Resolution::Requeued { handle, delay })
            }
        }
    }

    /// Count a failure and settle the job in one step.
    pub async fn resolve_failure(&self, mut reserved: ReservedJob) -> Result<Resolution, AppError> {
        self.record_failure(&mut reserved);
        self.settle(reserved).await
    }

    /// Count a success, build its record and settle the job in one step.
    pub async fn resolve_success(
        &self,
        mut reserved: ReservedJob,
        result: ExtractionResult,
    ) -> Result<(Resolution, ExchangeRecord), AppError> {
        let record = self.record_success(&mut reserved, result);
        let resolution = self.settle(reserved).await?;
        Ok((resolution, record))
    }

    /// Replace the reserved entry with one carrying the updated job state.
    pub async fn requeue(
        &self,
        handle: QueueHandle,
        job: &JobRecord,
        delay: Duration,
    ) -> Result<QueueHandle, AppError> {
        let payload = job.encode()?;
        self.queue.delete(handle).await?;

        self.queue
            .put(&payload, self.policy.priority, delay, self.policy.ttr)
            .await
            .map_err(|e| {
                tracing::error!(
                    %handle,
                    job = %job,
                    error = %e,
                    "Job lost: old entry deleted but replacement put failed"
                );
                AppError::JobLost {
                    from: job.from.clone(),
                    to: job.to.clone(),
                    reason: e.to_string(),
                }
            })
    }
}
