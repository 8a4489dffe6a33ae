use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("idempotency key already in flight: {0}")]
    DuplicateJob(String),

    #[error("invalid lock token")]
    InvalidLockToken,

    #[error("lock has expired")]
    LockExpired,

    #[error("job {0} is active and cannot be removed")]
    JobActive(String),

    #[error("job {0} is not in a failed state and cannot be retried")]
    JobNotRetryable(String),

    #[error("job is already in a terminal state")]
    JobAlreadyTerminal,

    #[error("handler already registered for kind: {0}")]
    HandlerAlreadyRegistered(String),

    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Job execution outcome - determines retry behavior
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// Store or upstream unreachable - retryable
    #[error("connection error: {0}")]
    Connection(String),

    /// Handler-level failure - retryable up to max_attempts
    #[error("processing error: {0}")]
    Processing(String),

    /// Malformed payload or bad input - terminal, never retried
    #[error("validation error: {0}")]
    Validation(String),

    /// No handler registered for this job kind - terminal
    #[error("no handler registered for job kind: {0}")]
    UnknownKind(String),
}

impl JobError {
    /// Create a retryable connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a retryable processing error
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a terminal validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the queue should schedule a retry for this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Processing(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Connection(msg)
            | Self::Processing(msg)
            | Self::Validation(msg)
            | Self::UnknownKind(msg) => msg,
        }
    }
}
