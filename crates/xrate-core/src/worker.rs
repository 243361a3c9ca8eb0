use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::job::{JobRecord, WorkerConfig};
use crate::lifecycle::{JobLifecycleManager, Resolution, ReservedJob};
use crate::models::{ExchangeRecord, ExtractionResult};
use crate::queue::{QueueHandle, QueueTransport};
use crate::rate::RateExtractor;
use crate::traits::{ExchangeSource, Fetcher};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Idle,
    JobReserved {
        handle: QueueHandle,
        job: &'a JobRecord,
    },
    AttemptFailed {
        job: &'a JobRecord,
        error: &'a AppError,
    },
    AttemptSucceeded {
        record: &'a ExchangeRecord,
    },
    JobSettled {
        job: &'a JobRecord,
        resolution: Resolution,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Idle => {
                tracing::trace!("No job available");
            }
            WorkerEvent::JobReserved { handle, job } => {
                tracing::debug!(%handle, %job, "Job reserved");
            }
            WorkerEvent::AttemptFailed { job, error } => {
                if error.is_extraction_failure() {
                    tracing::warn!(%job, %error, "Rate extraction failed");
                } else {
                    tracing::error!(%job, %error, "Attempt failed outside extraction");
                }
            }
            WorkerEvent::AttemptSucceeded { record } => {
                tracing::info!(
                    from = %record.from,
                    to = %record.to,
                    rate = %record.rate_text(),
                    success_count = record.success_count,
                    "Rate extracted"
                );
            }
            WorkerEvent::JobSettled { job, resolution } => match resolution {
                Resolution::Buried => tracing::warn!(%job, "Job buried after reaching fail limit"),
                Resolution::Deleted => {
                    tracing::info!(%job, "Job deleted after reaching success limit")
                }
                Resolution::Requeued { .. } => tracing::debug!(%job, %resolution, "Job requeued"),
            },
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Step of one worker iteration.
#[derive(Debug)]
enum WorkerState {
    Reserve,
    Extract(ReservedJob),
    OnError(ReservedJob, AppError),
    OnSuccess(ReservedJob, f64),
    PutBack(ReservedJob),
    Stop,
}

/// Worker that reserves jobs, extracts rates and settles each job with the
/// lifecycle policy.
///
/// Each iteration walks `Reserve → Extract → OnError | OnSuccess → PutBack`.
/// Successful attempts are published on a bounded channel; a full channel
/// blocks the worker until the consumer catches up.
pub struct WorkerService<Q, F, S>
where
    Q: QueueTransport,
    F: Fetcher,
    S: ExchangeSource,
{
    lifecycle: JobLifecycleManager<Q>,
    extractor: RateExtractor<F, S>,
    output: mpsc::Sender<ExchangeRecord>,
    config: WorkerConfig,
}

impl<Q, F, S> WorkerService<Q, F, S>
where
    Q: QueueTransport,
    F: Fetcher,
    S: ExchangeSource,
{
    pub fn new(
        lifecycle: JobLifecycleManager<Q>,
        extractor: RateExtractor<F, S>,
        output: mpsc::Sender<ExchangeRecord>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            lifecycle,
            extractor,
            output,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    ///
    /// Cancellation is observed before and after every reservation and while
    /// waiting on the idle backoff or the output channel. A job already
    /// reserved is always settled before the worker stops.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        let mut state = WorkerState::Reserve;
        loop {
            state = match state {
                WorkerState::Reserve => self.reserve(&cancel_token, reporter).await,
                WorkerState::Extract(reserved) => self.extract(reserved).await,
                WorkerState::OnError(reserved, error) => {
                    self.on_error(reserved, error, reporter)
                }
                WorkerState::OnSuccess(reserved, rate) => {
                    self.on_success(reserved, rate, &cancel_token, reporter)
                        .await
                }
                WorkerState::PutBack(reserved) => self.put_back(reserved, reporter).await,
                WorkerState::Stop => break,
            };
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });
        Ok(())
    }

    async fn reserve<WR: WorkerReporter>(
        &self,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) -> WorkerState {
        if cancel_token.is_cancelled() {
            return WorkerState::Stop;
        }

        // Not raced with cancellation: once the transport has claimed an
        // entry the job has to go through PutBack. The reserve timeout
        // bounds the wait.
        let backoff = match self.lifecycle.reserve(self.config.reserve_timeout).await {
            Ok(Some(reserved)) => {
                reporter.report(WorkerEvent::JobReserved {
                    handle: reserved.handle,
                    job: &reserved.job,
                });
                return WorkerState::Extract(reserved);
            }
            Ok(None) => {
                reporter.report(WorkerEvent::Idle);
                true
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(worker_id = %self.config.worker_id, error = %e, "Failed to reserve job");
                true
            }
            Err(e) => {
                tracing::error!(worker_id = %self.config.worker_id, error = %e, "Dropped undecodable job");
                false
            }
        };

        if cancel_token.is_cancelled() {
            return WorkerState::Stop;
        }
        if backoff && !self.config.idle_backoff.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(self.config.idle_backoff) => {}
                () = cancel_token.cancelled() => return WorkerState::Stop,
            }
        }
        WorkerState::Reserve
    }

    async fn extract(&self, reserved: ReservedJob) -> WorkerState {
        match self
            .extractor
            .extract_rate(&reserved.job.from, &reserved.job.to)
            .await
        {
            Ok(rate) => WorkerState::OnSuccess(reserved, rate),
            Err(e) => WorkerState::OnError(reserved, e),
        }
    }

    fn on_error<WR: WorkerReporter>(
        &self,
        mut reserved: ReservedJob,
        error: AppError,
        reporter: &WR,
    ) -> WorkerState {
        self.lifecycle.record_failure(&mut reserved);
        reporter.report(WorkerEvent::AttemptFailed {
            job: &reserved.job,
            error: &error,
        });
        WorkerState::PutBack(reserved)
    }

    async fn on_success<WR: WorkerReporter>(
        &self,
        mut reserved: ReservedJob,
        rate: f64,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) -> WorkerState {
        let record = self
            .lifecycle
            .record_success(&mut reserved, ExtractionResult::now(rate));
        reporter.report(WorkerEvent::AttemptSucceeded { record: &record });

        tokio::select! {
            biased;
            sent = self.output.send(record) => {
                if let Err(e) = sent {
                    tracing::error!(
                        worker_id = %self.config.worker_id,
                        from = %e.0.from,
                        to = %e.0.to,
                        "Output channel closed, record dropped"
                    );
                }
            }
            () = cancel_token.cancelled() => {
                tracing::warn!(
                    worker_id = %self.config.worker_id,
                    job = %reserved.job,
                    "Shutting down with full output channel, record dropped"
                );
            }
        }

        WorkerState::PutBack(reserved)
    }

    async fn put_back<WR: WorkerReporter>(
        &self,
        reserved: ReservedJob,
        reporter: &WR,
    ) -> WorkerState {
        let job = reserved.job.clone();
        match self.lifecycle.settle(reserved).await {
            Ok(resolution) => reporter.report(WorkerEvent::JobSettled {
                job: &job,
                resolution,
            }),
            Err(e) => {
                tracing::error!(worker_id = %self.config.worker_id, %job, error = %e, "Failed to settle job");
            }
        }
        WorkerState::Reserve
    }
}

/// A fixed number of workers sharing one transport, extractor and output
/// channel, each running as its own tokio task.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl WorkerPool {
    /// Spawn `size` workers. Worker ids are `config.worker_id` suffixed with
    /// the worker's index.
    ///
    /// The pool keeps no sender of its own: once every worker has stopped the
    /// output channel closes.
    pub fn spawn<Q, F, S>(
        size: usize,
        lifecycle: JobLifecycleManager<Q>,
        extractor: RateExtractor<F, S>,
        output: mpsc::Sender<ExchangeRecord>,
        config: WorkerConfig,
        cancel_token: CancellationToken,
    ) -> Result<Self, AppError>
    where
        Q: QueueTransport + 'static,
        F: Fetcher + 'static,
        S: ExchangeSource + 'static,
    {
        if size == 0 {
            return Err(AppError::ConfigError(
                "worker pool needs at least one worker".into(),
            ));
        }

        let handles = (0..size)
            .map(|i| {
                let worker = WorkerService::new(
                    lifecycle.clone(),
                    extractor.clone(),
                    output.clone(),
                    config
                        .clone()
                        .with_worker_id(format!("{}-{i}", config.worker_id)),
                );
                let token = cancel_token.clone();
                tokio::spawn(async move {
                    if let Err(e) = worker.run(token, &TracingWorkerReporter).await {
                        tracing::error!(error = %e, "Worker exited with error");
                    }
                })
            })
            .collect();

        Ok(Self {
            handles,
            cancel_token,
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker to stop after its current job.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Wait for every worker to stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }
}
