//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::error::AppError;
use crate::job::JobRecord;
use crate::models::ExchangeRecord;
use crate::queue::{BuriedEntry, QueueHandle, QueueTransport, Reservation};
use crate::traits::{Fetcher, PersistenceSink};
use crate::worker::{WorkerEvent, WorkerReporter};

/// Stub xe.com page: two matching cells, the first carrying a trailing
/// non-breaking space, plus a non-matching div with the same class.
pub const XE_PAGE: &str = r#"
<html>
<body>
<table>
<tr class="uccRes">Something here
<td class="rightCol">10.23&nbsp</td>
<td class="rightCol">1</td>
</tr>
</table>
<div class="rightCol">11</div>
</body>
</html>"#;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, the fallback is repeated.
    responses: Arc<Mutex<Vec<Result<Vec<u8>, AppError>>>>,
    fallback: Arc<Mutex<Option<String>>>,
    pub urls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Always returns `html`.
    pub fn new(html: &str) -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            fallback: Arc::new(Mutex::new(Some(html.to_string()))),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns `error` once, then an HTTP error for every further call.
    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    /// Pops responses in order; once exhausted every call fails.
    pub fn with_responses(responses: Vec<Result<Vec<u8>, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fallback: Arc::new(Mutex::new(None)),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        self.urls.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            return responses.remove(0);
        }
        match self.fallback.lock().unwrap().as_ref() {
            Some(html) => Ok(html.as_bytes().to_vec()),
            None => Err(AppError::HttpError("no response configured".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryQueue
// ---------------------------------------------------------------------------

/// Recorded put: the payload as sent plus its scheduling parameters.
#[derive(Debug, Clone)]
pub struct PutRecord {
    pub handle: QueueHandle,
    pub payload: Vec<u8>,
    pub priority: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Ready,
    Reserved,
    Buried,
}

#[derive(Debug, Clone)]
struct Entry {
    handle: QueueHandle,
    payload: Vec<u8>,
    priority: u32,
    state: EntryState,
    visible_at: Instant,
}

/// In-memory queue transport that honours delays and records every call.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    entries: Arc<Mutex<Vec<Entry>>>,
    next_id: Arc<Mutex<i64>>,
    put_errors: Arc<Mutex<Vec<AppError>>>,
    reserve_errors: Arc<Mutex<Vec<AppError>>>,
    reply_delay: Arc<Mutex<Duration>>,
    pub put_log: Arc<Mutex<Vec<PutRecord>>>,
    pub deleted: Arc<Mutex<Vec<QueueHandle>>>,
    pub buried: Arc<Mutex<Vec<QueueHandle>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `put` fails with `error` (and stores nothing).
    pub fn fail_next_put(&self, error: AppError) {
        self.put_errors.lock().unwrap().push(error);
    }

    /// The next `reserve` fails with `error`.
    pub fn fail_next_reserve(&self, error: AppError) {
        self.reserve_errors.lock().unwrap().push(error);
    }

    /// `reserve` claims the entry, then waits `delay` before replying.
    pub fn delay_replies(&self, delay: Duration) {
        *self.reply_delay.lock().unwrap() = delay;
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        self.put_log.lock().unwrap().clone()
    }

    pub fn deleted_handles(&self) -> Vec<QueueHandle> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn buried_handles(&self) -> Vec<QueueHandle> {
        self.buried.lock().unwrap().clone()
    }

    /// Entries waiting to be reserved, delayed or not.
    pub fn ready_len(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.state == EntryState::Ready)
            .count()
    }

    fn try_reserve(&self) -> Option<Reservation> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .filter(|e| e.state == EntryState::Ready && e.visible_at <= now)
            .min_by_key(|e| (e.priority, e.handle))?;
        entry.state = EntryState::Reserved;
        Some(Reservation {
            handle: entry.handle,
            payload: entry.payload.clone(),
        })
    }

    fn entry_mut<T>(
        &self,
        handle: QueueHandle,
        f: impl FnOnce(&mut Vec<Entry>, usize) -> T,
    ) -> Result<T, AppError> {
        let mut entries = self.entries.lock().unwrap();
        let pos = entries
            .iter()
            .position(|e| e.handle == handle)
            .ok_or_else(|| AppError::Transport(format!("NOT_FOUND: {handle}")))?;
        Ok(f(&mut entries, pos))
    }
}

impl QueueTransport for MemoryQueue {
    async fn reserve(&self, timeout: Duration) -> Result<Option<Reservation>, AppError> {
        if let Some(e) = self.reserve_errors.lock().unwrap().pop() {
            return Err(e);
        }
        let reservation = match self.try_reserve() {
            Some(reservation) => Some(reservation),
            None => {
                tokio::time::sleep(timeout).await;
                self.try_reserve()
            }
        };
        let delay = *self.reply_delay.lock().unwrap();
        if reservation.is_some() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(reservation)
    }

    async fn put(
        &self,
        payload: &[u8],
        priority: u32,
        delay: Duration,
        _ttr: Duration,
    ) -> Result<QueueHandle, AppError> {
        if let Some(e) = self.put_errors.lock().unwrap().pop() {
            return Err(e);
        }
        let handle = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            QueueHandle(*next)
        };
        self.entries.lock().unwrap().push(Entry {
            handle,
            payload: payload.to_vec(),
            priority,
            state: EntryState::Ready,
            visible_at: Instant::now() + delay,
        });
        self.put_log.lock().unwrap().push(PutRecord {
            handle,
            payload: payload.to_vec(),
            priority,
            delay,
        });
        Ok(handle)
    }

    async fn delete(&self, handle: QueueHandle) -> Result<(), AppError> {
        self.entry_mut(handle, |entries, pos| {
            entries.remove(pos);
        })?;
        self.deleted.lock().unwrap().push(handle);
        Ok(())
    }

    async fn bury(&self, handle: QueueHandle, priority: u32) -> Result<(), AppError> {
        self.entry_mut(handle, |entries, pos| {
            entries[pos].state = EntryState::Buried;
            entries[pos].priority = priority;
        })?;
        self.buried.lock().unwrap().push(handle);
        Ok(())
    }

    async fn kick(&self, bound: u64) -> Result<u64, AppError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let mut kicked = 0u64;
        for entry in entries.iter_mut() {
            if kicked >= bound {
                break;
            }
            if entry.state == EntryState::Buried {
                entry.state = EntryState::Ready;
                entry.visible_at = now;
                kicked += 1;
            }
        }
        Ok(kicked)
    }

    async fn list_buried(&self, limit: usize) -> Result<Vec<BuriedEntry>, AppError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.state == EntryState::Buried)
            .take(limit)
            .map(|e| BuriedEntry {
                handle: e.handle,
                payload: e.payload.clone(),
                priority: e.priority,
                buried_at: Utc::now(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Mock persistence sink that records inserts and can simulate outages.
#[derive(Clone, Default)]
pub struct MockSink {
    pub inserted: Arc<Mutex<Vec<ExchangeRecord>>>,
    insert_errors: Arc<Mutex<Vec<AppError>>>,
    ping_errors: Arc<Mutex<Vec<AppError>>>,
    pub pings: Arc<Mutex<u32>>,
}

impl MockSink {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fail the next `n` inserts with a database error.
    pub fn with_insert_failures(n: usize) -> Self {
        let sink = Self::default();
        for _ in 0..n {
            sink.insert_errors
                .lock()
                .unwrap()
                .push(AppError::DatabaseError("connection refused".into()));
        }
        sink
    }

    /// Fail the next insert with `error`.
    pub fn with_insert_error(error: AppError) -> Self {
        let sink = Self::default();
        sink.insert_errors.lock().unwrap().push(error);
        sink
    }

    /// Fail the next `n` pings with a database error.
    pub fn with_ping_failures(self, n: usize) -> Self {
        for _ in 0..n {
            self.ping_errors
                .lock()
                .unwrap()
                .push(AppError::DatabaseError("connection refused".into()));
        }
        self
    }

    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn ping_count(&self) -> u32 {
        *self.pings.lock().unwrap()
    }
}

impl PersistenceSink for MockSink {
    async fn insert(&self, record: &ExchangeRecord) -> Result<(), AppError> {
        if let Some(e) = self.insert_errors.lock().unwrap().pop() {
            return Err(e);
        }
        self.inserted.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        *self.pings.lock().unwrap() += 1;
        match self.ping_errors.lock().unwrap().pop() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::Idle => "Idle",
            WorkerEvent::JobReserved { .. } => "JobReserved",
            WorkerEvent::AttemptFailed { .. } => "AttemptFailed",
            WorkerEvent::AttemptSucceeded { .. } => "AttemptSucceeded",
            WorkerEvent::JobSettled { .. } => "JobSettled",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a queue holding the given jobs, ready immediately.
pub async fn queue_with(jobs: &[JobRecord]) -> MemoryQueue {
    let queue = MemoryQueue::new();
    for job in jobs {
        queue
            .put(
                &job.encode().unwrap(),
                1,
                Duration::ZERO,
                Duration::from_secs(60),
            )
            .await
            .unwrap();
    }
    queue
}
