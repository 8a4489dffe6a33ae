use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Display;
use std::hash::Hash;
use std::time::Duration;

/// Bound alias for the closed job-type tag. Consumers define an enum and
/// get compile-time-checked dispatch; the queue never sees raw strings.
pub trait JobKind:
    Clone + Eq + Hash + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> JobKind for T where
    T: Clone + Eq + Hash + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Default retry budget for jobs that don't override it
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Exponential backoff policy: `min(initial * 2^(attempt - 1), max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before the next retry. `attempts_made` is the attempt that
    /// just failed, starting at 1, so the first retry waits `initial`.
    pub fn delay(&self, attempts_made: u32) -> Duration {
        let exp = attempts_made.saturating_sub(1).min(31);
        self.initial.saturating_mul(1u32 << exp).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(3600),
        }
    }
}

/// Rolling-window rate limit shared by every worker bound to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum claims per window
    pub max: u32,
    /// Window length
    pub duration: Duration,
}

/// Bounds on how long terminal jobs are kept for operator inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_count: usize,
    pub max_age: Duration,
}

impl RetentionPolicy {
    pub fn new(max_count: usize, max_age: Duration) -> Self {
        Self { max_count, max_age }
    }
}

/// Queue-wide configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Default backoff for jobs without a per-job override
    pub backoff: BackoffPolicy,
    /// Optional claim rate limit across all bound workers
    pub rate_limit: Option<RateLimit>,
    /// How long a claimed job may run before its lock expires
    pub lock_duration: Duration,
    /// A job reclaimed more than this many times is failed terminally
    pub max_stalled_count: u32,
    /// Retention for completed jobs
    pub retention_completed: RetentionPolicy,
    /// Retention for failed jobs (kept longer for inspection)
    pub retention_failed: RetentionPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            rate_limit: None,
            lock_duration: Duration::from_secs(30),
            max_stalled_count: 2,
            retention_completed: RetentionPolicy::new(1_000, Duration::from_secs(24 * 3600)),
            retention_failed: RetentionPolicy::new(5_000, Duration::from_secs(7 * 24 * 3600)),
        }
    }
}

/// Immutable job submission data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec<K> {
    /// Closed job-type tag selecting the handler
    pub kind: K,

    /// Opaque structured payload the handler interprets
    pub payload: serde_json::Value,

    /// Lower value = served first among waiting jobs
    pub priority: i32,

    /// Retry budget
    pub max_attempts: u32,

    /// Per-job backoff override; queue default applies when absent
    pub backoff: Option<BackoffPolicy>,

    /// Initial delay before the job becomes eligible
    pub delay: Option<Duration>,

    /// Caller-supplied idempotency key; reuse while a job with the same
    /// key is in flight is rejected
    pub idempotency_key: Option<String>,
}

impl<K> JobSpec<K> {
    pub fn new(kind: K) -> Self {
        Self {
            kind,
            payload: serde_json::Value::Null,
            priority: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: None,
            delay: None,
            idempotency_key: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
