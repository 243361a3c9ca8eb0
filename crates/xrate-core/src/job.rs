use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Result of the most recent extraction attempt on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Unknown,
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Unknown => "unknown",
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A currency-conversion job as carried through the queue.
///
/// Counters only ever grow. Termination is decided outside the record by
/// [`JobLifecycleManager`](crate::lifecycle::JobLifecycleManager) from the
/// counter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub from: String,
    pub to: String,
    pub fail_count: u32,
    pub success_count: u32,
    pub last_outcome: Outcome,
}

impl JobRecord {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            fail_count: 0,
            success_count: 0,
            last_outcome: Outcome::Unknown,
        }
    }

    /// Record a failed extraction attempt.
    pub fn fail(&mut self) {
        self.fail_count = self.fail_count.saturating_add(1);
        self.last_outcome = Outcome::Failure;
    }

    /// Record a successful extraction attempt.
    pub fn succeed(&mut self) {
        self.success_count = self.success_count.saturating_add(1);
        self.last_outcome = Outcome::Success;
    }

    /// Serialize to the queue payload format.
    pub fn encode(&self) -> Result<Vec<u8>, AppError> {
        Ok(serde_json::to_vec(&JobPayload::from(self))?)
    }

    /// Deserialize from a queue payload.
    pub fn decode(data: &[u8]) -> Result<Self, AppError> {
        let payload: JobPayload = serde_json::from_slice(data)?;
        Ok(payload.into())
    }
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (fail={}, success={}, last={})",
            self.from, self.to, self.fail_count, self.success_count, self.last_outcome
        )
    }
}

// -- Wire format --
//
// `Successful` is null until the first attempt so that `Unknown` survives a
// round trip. Producers may omit everything except `From` and `To`.

#[derive(Serialize, Deserialize)]
struct JobPayload {
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "To")]
    to: String,
    #[serde(rename = "FailCounter", default)]
    fail_counter: u32,
    #[serde(rename = "SuccessCounter", default)]
    success_counter: u32,
    #[serde(rename = "Successful", default)]
    successful: Option<bool>,
}

impl From<&JobRecord> for JobPayload {
    fn from(job: &JobRecord) -> Self {
        JobPayload {
            from: job.from.clone(),
            to: job.to.clone(),
            fail_counter: job.fail_count,
            success_counter: job.success_count,
            successful: match job.last_outcome {
                Outcome::Unknown => None,
                Outcome::Success => Some(true),
                Outcome::Failure => Some(false),
            },
        }
    }
}

impl From<JobPayload> for JobRecord {
    fn from(payload: JobPayload) -> Self {
        JobRecord {
            from: payload.from,
            to: payload.to,
            fail_count: payload.fail_counter,
            success_count: payload.success_counter,
            last_outcome: match payload.successful {
                None => Outcome::Unknown,
                Some(true) => Outcome::Success,
                Some(false) => Outcome::Failure,
            },
        }
    }
}

/// Thresholds and delays deciding what happens to a job after an attempt.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    /// Bury the job when its fail counter reaches exactly this value.
    pub fail_limit: u32,
    /// Delete the job when its success counter reaches exactly this value.
    pub success_limit: u32,
    pub delay_on_failure: Duration,
    pub delay_on_success: Duration,
    /// Priority used for put and bury (lower is more urgent).
    pub priority: u32,
    /// Time-to-run: how long a reservation is held before the entry becomes
    /// reservable again.
    pub ttr: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            fail_limit: 3,
            success_limit: 10,
            delay_on_failure: Duration::from_secs(3),
            delay_on_success: Duration::from_secs(60),
            priority: 1,
            ttr: Duration::from_secs(60),
        }
    }
}

impl LifecyclePolicy {
    pub fn with_limits(mut self, fail_limit: u32, success_limit: u32) -> Self {
        self.fail_limit = fail_limit;
        self.success_limit = success_limit;
        self
    }

    pub fn with_delays(mut self, on_failure: Duration, on_success: Duration) -> Self {
        self.delay_on_failure = on_failure;
        self.delay_on_success = on_success;
        self
    }

    pub fn with_ttr(mut self, ttr: Duration) -> Self {
        self.ttr = ttr;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.fail_limit == 0 {
            return Err(AppError::ConfigError("fail limit must be at least 1".into()));
        }
        if self.success_limit == 0 {
            return Err(AppError::ConfigError(
                "success limit must be at least 1".into(),
            ));
        }
        if self.ttr.is_zero() {
            return Err(AppError::ConfigError("ttr must be greater than zero".into()));
        }
        Ok(())
    }

    /// Reject a ttr that an attempt bounded by `attempt_timeout` could
    /// outlive. Once a reservation expires the entry can be handed to another
    /// worker while the first one still acts on it.
    pub fn check_ttr_covers(&self, attempt_timeout: Duration) -> Result<(), AppError> {
        if self.ttr <= attempt_timeout {
            return Err(AppError::ConfigError(format!(
                "ttr ({}s) must be longer than the fetch timeout ({}s)",
                self.ttr.as_secs_f64(),
                attempt_timeout.as_secs_f64()
            )));
        }
        Ok(())
    }
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// How long a single reserve call may wait for a job.
    pub reserve_timeout: Duration,
    /// Pause after an empty reservation or a transport error. Zero means
    /// retry immediately.
    pub idle_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            reserve_timeout: Duration::from_millis(10),
            idle_backoff: Duration::ZERO,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_reserve_timeout(mut self, timeout: Duration) -> Self {
        self.reserve_timeout = timeout;
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }
}
