use std::time::Duration;

use url::Url;
use xrate_core::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the queue and rate store.
///
/// Built from the CLI (`--database-url`/`DATABASE_URL`,
/// `--db-max-connections`/`DATABASE_MAX_CONNECTIONS`) and checked once with
/// [`validate`](Self::validate) before anything connects.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Explicit pool size. `None` means sized from the workload.
    pub max_connections: Option<u32>,
    /// How long a worker waits for a free pooled connection.
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: None,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Size the pool for `workers` concurrent workers plus the publisher,
    /// unless a size was set explicitly.
    pub fn sized_for_workers(mut self, workers: usize) -> Self {
        if self.max_connections.is_none() {
            let wanted = u32::try_from(workers).unwrap_or(u32::MAX).saturating_add(1);
            self.max_connections = Some(wanted.max(DEFAULT_MAX_CONNECTIONS));
        }
        self
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let url = Url::parse(&self.url)
            .map_err(|e| AppError::ConfigError(format!("Invalid database URL: {e}")))?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(AppError::ConfigError(format!(
                "Unsupported database scheme '{}': expected postgres://",
                url.scheme()
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(AppError::ConfigError("Database URL has no host".into()));
        }
        if self.max_connections == Some(0) {
            return Err(AppError::ConfigError(
                "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }
        if self.acquire_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "Connection acquire timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The URL with its password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<invalid url>".into(),
        }
    }
}
