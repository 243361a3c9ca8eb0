use thiserror::Error;

/// Application-wide error types for xrate.
#[derive(Error, Debug)]
pub enum AppError {
    /// Queue transport operation failed (reserve/put/delete/bury).
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Raw document could not be turned into a tree.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Selector occurrence points past the list of matching nodes.
    #[error("Selector occurrence {occurrence} out of range ({found} matching nodes)")]
    SelectorOutOfRange { occurrence: usize, found: usize },

    /// Page did not contain the node carrying the rate.
    #[error("Rate node not found for {from} -> {to}: {reason}")]
    NodeNotFound {
        from: String,
        to: String,
        reason: String,
    },

    /// Rate text could not be parsed as a decimal number.
    #[error("Invalid rate format {text:?} for {from} -> {to}: {source}")]
    RateFormat {
        text: String,
        from: String,
        to: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    /// Job payload serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Old reservation was deleted but the replacement entry could not be put.
    #[error("Job {from} -> {to} lost during requeue: {reason}")]
    JobLost {
        from: String,
        to: String,
        reason: String,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The store refused a record (constraint violation); retrying cannot help.
    #[error("Record rejected by store: {0}")]
    Rejected(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if this error came out of a single extraction attempt
    /// (fetch, parse, lookup or rate formatting) and should feed the job's
    /// failure path rather than abort the worker iteration.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_)
                | AppError::Timeout(_)
                | AppError::NetworkError(_)
                | AppError::Parse(_)
                | AppError::SelectorOutOfRange { .. }
                | AppError::NodeNotFound { .. }
                | AppError::RateFormat { .. }
        )
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::Transport(_)
            | AppError::DatabaseError(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}
