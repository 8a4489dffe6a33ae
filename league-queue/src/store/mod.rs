pub mod memory;

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use std::time::Duration;

use crate::{
    ClaimedJob, JobEvent, JobId, JobKind, JobRecord, JobSpec, LockToken, QueueError, QueueResult,
    RetentionPolicy, StateCounts, StateKind,
};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Outcome of a bulk enqueue. The succeeded subset is never rolled back;
/// failed entries are reported by input index so the caller can retry them.
#[derive(Debug, Clone, Default)]
pub struct BulkEnqueueResult {
    pub succeeded: Vec<JobId>,
    pub failed: Vec<(usize, QueueError)>,
}

impl BulkEnqueueResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Storage primitives for a durable, named job queue.
///
/// Workers never mutate queue bookkeeping directly: they claim jobs and
/// report outcomes, and the store performs all retry/terminal
/// classification, rate accounting, and state transitions atomically.
#[async_trait]
pub trait JobStore<K: JobKind>: Send + Sync {
    /// Add a job. Rejects an idempotency key that is still in flight;
    /// a key whose previous job reached a terminal state may be reused.
    async fn enqueue(&self, spec: JobSpec<K>) -> QueueResult<JobId>;

    /// Batch add with per-entry outcomes
    async fn enqueue_bulk(&self, specs: Vec<JobSpec<K>>) -> QueueResult<BulkEnqueueResult>;

    /// Atomically claim the best eligible waiting job: `(priority,
    /// enqueue-time)` order, paused and rate-limited queues yield `None`.
    /// The claim assigns a lock token and consumes one attempt.
    async fn claim(&self) -> QueueResult<Option<ClaimedJob<K>>>;

    /// Extend the lock deadline of an active job
    async fn renew_lock(&self, id: &JobId, token: &LockToken, extend: Duration) -> QueueResult<()>;

    /// Acknowledge success. Requires the valid lock token.
    async fn report_success(&self, id: &JobId, token: &LockToken) -> QueueResult<()>;

    /// Acknowledge failure. The store classifies: retryable errors with
    /// attempts remaining are delayed per backoff, everything else goes
    /// terminal failed - never silently dropped.
    async fn report_failure(
        &self,
        id: &JobId,
        token: &LockToken,
        error: String,
        retryable: bool,
    ) -> QueueResult<()>;

    /// Record handler progress, 0-100
    async fn report_progress(&self, id: &JobId, token: &LockToken, percent: u8) -> QueueResult<()>;

    /// Abandon an active job back to the queue without consuming its
    /// attempt (immediate pause); it is retried per backoff
    async fn release(&self, id: &JobId) -> QueueResult<()>;

    /// Remove a waiting, delayed, or terminal job. An active job cannot be
    /// forcibly cancelled and yields `QueueError::JobActive`.
    async fn remove(&self, id: &JobId) -> QueueResult<()>;

    /// Reset a failed job into waiting with a fresh retry budget
    async fn retry(&self, id: &JobId) -> QueueResult<()>;

    /// Clear waiting and delayed jobs; active jobs are left alone.
    /// Returns the number of jobs dropped.
    async fn drain(&self) -> QueueResult<usize>;

    async fn get(&self, id: &JobId) -> QueueResult<JobRecord<K>>;

    async fn jobs_by_state(&self, state: StateKind) -> QueueResult<Vec<JobRecord<K>>>;

    async fn counts(&self) -> QueueResult<StateCounts>;

    /// Stop new claims; in-flight jobs are unaffected
    async fn pause(&self);

    async fn resume(&self);

    fn is_paused(&self) -> bool;

    /// Move expired-lock jobs back to waiting (or terminal failed past the
    /// stall limit). Returns the number reclaimed.
    async fn reap_expired_locks(&self) -> QueueResult<usize>;

    /// Move due delayed jobs into waiting. Returns the number promoted.
    async fn promote_due(&self) -> QueueResult<usize>;

    /// Purge terminal jobs past the retention bounds. Returns the number
    /// purged.
    async fn purge_terminal(
        &self,
        completed: &RetentionPolicy,
        failed: &RetentionPolicy,
    ) -> QueueResult<usize>;

    /// Lifecycle event stream for observers
    fn event_stream(&self) -> BoxStream<JobEvent<K>>;
}
