use std::fmt;

use league_queue::JobError;
use thiserror::Error;

/// Errors from the upstream data source. Everything is retryable except a
/// 4xx validation-class rejection: the same request will keep failing.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Network(String),

    #[error("upstream rate limited")]
    RateLimited,

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("upstream rejected request ({status}): {message}")]
    Validation { status: u16, message: String },
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }
}

/// Errors from the source-of-truth store. Connection trouble is worth
/// retrying; a constraint violation is not.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store constraint violation: {0}")]
    Constraint(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Which pipeline stage an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Fetch,
    Transform,
    Upsert,
    CacheRefresh,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Transform => "transform",
            Self::Upsert => "upsert",
            Self::CacheRefresh => "cache_refresh",
        };
        f.write_str(name)
    }
}

/// Pipeline failure tagged with the stage it came from. A cache-refresh
/// failure never reaches here: the write path already invalidated, so it
/// only costs performance and is logged at the call site.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] UpstreamError),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("upsert failed: {0}")]
    Upsert(#[from] StoreError),
}

impl SyncError {
    pub fn step(&self) -> SyncStep {
        match self {
            Self::Fetch(_) => SyncStep::Fetch,
            Self::Transform(_) => SyncStep::Transform,
            Self::Upsert(_) => SyncStep::Upsert,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_retryable(),
            Self::Transform(_) => false,
            Self::Upsert(err) => err.is_retryable(),
        }
    }
}

impl From<SyncError> for JobError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match &err {
            SyncError::Fetch(UpstreamError::Network(_))
            | SyncError::Upsert(StoreError::Connection(_)) => JobError::connection(message),
            SyncError::Fetch(upstream) if upstream.is_retryable() => {
                JobError::processing(message)
            }
            SyncError::Fetch(_) | SyncError::Transform(_) | SyncError::Upsert(_) => {
                JobError::validation(message)
            }
        }
    }
}
