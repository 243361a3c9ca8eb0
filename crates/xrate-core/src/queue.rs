use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::AppError;

/// Identifies one entry (and its reservation) inside a queue transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueHandle(pub i64);

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entry reserved for exclusive processing, payload still encoded.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub handle: QueueHandle,
    pub payload: Vec<u8>,
}

/// A buried entry awaiting an operator.
#[derive(Debug, Clone)]
pub struct BuriedEntry {
    pub handle: QueueHandle,
    pub payload: Vec<u8>,
    pub priority: u32,
    pub buried_at: DateTime<Utc>,
}

/// Work-queue transport for one tube.
///
/// Implementations must make `reserve` atomic: an entry is held by at most
/// one reservation at a time. A reservation not resolved within its
/// time-to-run becomes reservable again.
pub trait QueueTransport: Send + Sync + Clone {
    /// Reserve the next ready entry, waiting at most `timeout`.
    ///
    /// Returns `None` if nothing became available in time.
    fn reserve(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Reservation>, AppError>> + Send;

    /// Insert a new entry that becomes visible once `delay` has elapsed.
    fn put(
        &self,
        payload: &[u8],
        priority: u32,
        delay: Duration,
        ttr: Duration,
    ) -> impl Future<Output = Result<QueueHandle, AppError>> + Send;

    fn delete(&self, handle: QueueHandle) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Take a reserved entry out of rotation until an operator kicks it.
    fn bury(
        &self,
        handle: QueueHandle,
        priority: u32,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Move up to `bound` buried entries back to ready. Returns how many moved.
    fn kick(&self, bound: u64) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Buried entries, oldest first.
    fn list_buried(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<BuriedEntry>, AppError>> + Send;
}
