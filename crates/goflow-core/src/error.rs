use thiserror::Error;

/// Core error type for goflow operations.
#[derive(Error, Debug)]
pub enum GoflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The step ledger, timer store or run store could not be reached.
    /// Forward progress stops; the run stays retryable.
    #[error("Store unavailable: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GoflowError {
    /// Whether the error came from an unavailable persistence backend.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<serde_json::Error> for GoflowError {
    fn from(e: serde_json::Error) -> Self {
        GoflowError::Serialization(e.to_string())
    }
}

/// Result type alias using GoflowError.
pub type Result<T> = std::result::Result<T, GoflowError>;

/// Failure of a single workflow step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// External call failed in a way that may succeed on retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The step can never succeed (entity gone, malformed data).
    #[error("{0}")]
    Terminal(String),

    /// The persistence layer backing the engine is unavailable.
    #[error("store unavailable: {0}")]
    Store(String),
}

impl StepError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    /// Check if the step may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::Terminal(format!("malformed step data: {}", e))
    }
}

impl From<sqlx::Error> for StepError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_) => StepError::Transient(e.to_string()),
            other => StepError::Terminal(other.to_string()),
        }
    }
}

impl From<GoflowError> for StepError {
    fn from(e: GoflowError) -> Self {
        match e {
            GoflowError::Sql(e) => e.into(),
            GoflowError::Database(msg) | GoflowError::Store(msg) => StepError::Transient(msg),
            GoflowError::Io(e) => StepError::Transient(e.to_string()),
            other => StepError::Terminal(other.to_string()),
        }
    }
}
