use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::store::{BoxStream, BulkEnqueueResult, JobStore};
use crate::{
    ClaimedJob, JobEvent, JobId, JobKind, JobRecord, JobSpec, JobState, LockToken, QueueConfig,
    QueueError, QueueResult, RetentionPolicy, StateCounts, StateKind,
};

/// All mutable queue state behind one lock, so claim/ack/reap transitions
/// are atomic with respect to each other.
struct Inner<K> {
    /// Job records indexed by id
    jobs: HashMap<JobId, JobRecord<K>>,

    /// Waiting jobs in `(priority, created_at)` order
    ready: Vec<JobId>,

    /// Idempotency key -> job id; the key is live while that job is
    /// non-terminal
    idempotency: HashMap<String, JobId>,

    /// Claim timestamps inside the current rate window
    claim_times: VecDeque<Instant>,
}

/// In-memory durable-store stand-in. The canonical implementation for
/// tests and single-process deployments; external stores implement the
/// same `JobStore` contract.
pub struct MemoryStore<K: JobKind> {
    config: QueueConfig,
    inner: RwLock<Inner<K>>,
    paused: AtomicBool,
    events: broadcast::Sender<JobEvent<K>>,
}

impl<K: JobKind> MemoryStore<K> {
    pub fn new(config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            config,
            inner: RwLock::new(Inner {
                jobs: HashMap::new(),
                ready: Vec::new(),
                idempotency: HashMap::new(),
                claim_times: VecDeque::new(),
            }),
            paused: AtomicBool::new(false),
            events,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn emit(&self, event: JobEvent<K>) {
        // No subscribers is fine; observers are never on the critical path
        let _ = self.events.send(event);
    }

    /// Insert into the ready list keeping `(priority, created_at)` order,
    /// lower priority value first
    fn insert_ready(inner: &mut Inner<K>, id: JobId) {
        let key = match inner.jobs.get(&id) {
            Some(record) => (record.spec.priority, record.created_at),
            None => return,
        };
        let pos = inner
            .ready
            .iter()
            .position(|other| match inner.jobs.get(other) {
                Some(record) => key < (record.spec.priority, record.created_at),
                None => true,
            })
            .unwrap_or(inner.ready.len());
        inner.ready.insert(pos, id);
    }

    /// Move due delayed jobs into waiting. Runs inline on every claim so a
    /// backoff expiry is picked up without waiting for the maintenance tick.
    fn promote_locked(&self, inner: &mut Inner<K>, now: chrono::DateTime<chrono::Utc>) -> usize {
        let due: Vec<JobId> = inner
            .jobs
            .iter()
            .filter_map(|(id, record)| match &record.state {
                JobState::Delayed { until } if *until <= now => Some(id.clone()),
                _ => None,
            })
            .collect();

        for id in &due {
            if let Some(record) = inner.jobs.get_mut(id) {
                record.state = JobState::Waiting;
                record.updated_at = now;
            }
            Self::insert_ready(inner, id.clone());
        }
        due.len()
    }

    /// Whether the rate window still has room; records the claim if so
    fn rate_allows(&self, inner: &mut Inner<K>) -> bool {
        let Some(limit) = self.config.rate_limit else {
            return true;
        };
        let now = Instant::now();
        while let Some(front) = inner.claim_times.front() {
            if now.duration_since(*front) > limit.duration {
                inner.claim_times.pop_front();
            } else {
                break;
            }
        }
        if inner.claim_times.len() >= limit.max as usize {
            return false;
        }
        inner.claim_times.push_back(now);
        true
    }

    fn enqueue_locked(&self, inner: &mut Inner<K>, spec: JobSpec<K>) -> QueueResult<JobId> {
        if let Some(key) = &spec.idempotency_key {
            if let Some(existing_id) = inner.idempotency.get(key) {
                match inner.jobs.get(existing_id) {
                    Some(existing) if !existing.is_terminal() => {
                        return Err(QueueError::DuplicateJob(key.clone()));
                    }
                    // Terminal or vanished: the key may be reused
                    _ => {}
                }
            }
        }

        let id = JobId::new();
        let record = JobRecord::new(id.clone(), spec);
        let kind = record.spec.kind.clone();
        let waiting = matches!(record.state, JobState::Waiting);

        if let Some(key) = &record.spec.idempotency_key {
            inner.idempotency.insert(key.clone(), id.clone());
        }
        inner.jobs.insert(id.clone(), record);
        if waiting {
            Self::insert_ready(inner, id.clone());
        }

        self.emit(JobEvent::Enqueued {
            id: id.clone(),
            kind,
            at: Utc::now(),
        });
        Ok(id)
    }

    /// Validate that `token` currently owns `id`'s lock
    fn verify_lock(record: &JobRecord<K>, token: &LockToken) -> QueueResult<()> {
        if record.is_terminal() {
            return Err(QueueError::JobAlreadyTerminal);
        }
        let JobState::Active { lock_until } = &record.state else {
            return Err(QueueError::InvalidLockToken);
        };
        if record.lock_token.as_ref() != Some(token) {
            return Err(QueueError::InvalidLockToken);
        }
        if *lock_until < Utc::now() {
            return Err(QueueError::LockExpired);
        }
        Ok(())
    }

    /// Push an active job's lock deadline into the past (test helper)
    pub fn force_lock_expiry(&self, id: &JobId) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.jobs.get_mut(id) {
            if let JobState::Active { ref mut lock_until } = record.state {
                *lock_until = Utc::now() - chrono::Duration::seconds(1);
                record.updated_at = Utc::now();
            }
        }
    }
}

#[async_trait]
impl<K: JobKind> JobStore<K> for MemoryStore<K> {
    async fn enqueue(&self, spec: JobSpec<K>) -> QueueResult<JobId> {
        let mut inner = self.inner.write();
        self.enqueue_locked(&mut inner, spec)
    }

    async fn enqueue_bulk(&self, specs: Vec<JobSpec<K>>) -> QueueResult<BulkEnqueueResult> {
        let mut inner = self.inner.write();
        let mut result = BulkEnqueueResult::default();
        for (index, spec) in specs.into_iter().enumerate() {
            match self.enqueue_locked(&mut inner, spec) {
                Ok(id) => result.succeeded.push(id),
                Err(err) => result.failed.push((index, err)),
            }
        }
        Ok(result)
    }

    async fn claim(&self) -> QueueResult<Option<ClaimedJob<K>>> {
        if self.paused.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let now = Utc::now();
        let mut inner = self.inner.write();
        self.promote_locked(&mut inner, now);

        // Find the first ready entry that is still a waiting job; entries
        // for removed or transitioned jobs are dropped along the way
        let id = loop {
            if inner.ready.is_empty() {
                return Ok(None);
            }
            let candidate = inner.ready.remove(0);
            match inner.jobs.get(&candidate) {
                Some(record) if matches!(record.state, JobState::Waiting) => break candidate,
                _ => continue,
            }
        };

        if !self.rate_allows(&mut inner) {
            // Window exhausted: the job stays at the head of the line
            inner.ready.insert(0, id);
            return Ok(None);
        }

        let token = LockToken::new();
        let lock_until =
            now + chrono::Duration::from_std(self.config.lock_duration).unwrap_or_default();
        let record = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        record.start_active(token.clone(), lock_until);
        let claimed = ClaimedJob {
            record: record.clone(),
            lock_token: token,
            lock_until,
        };

        self.emit(JobEvent::Active {
            id: id.clone(),
            at: now,
        });
        debug!(job_id = %id, "claimed job");
        Ok(Some(claimed))
    }

    async fn renew_lock(&self, id: &JobId, token: &LockToken, extend: Duration) -> QueueResult<()> {
        let mut inner = self.inner.write();
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        Self::verify_lock(record, token)?;

        if let JobState::Active { ref mut lock_until } = record.state {
            *lock_until = Utc::now() + chrono::Duration::from_std(extend).unwrap_or_default();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn report_success(&self, id: &JobId, token: &LockToken) -> QueueResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        Self::verify_lock(record, token)?;

        let duration_ms = record
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        record.complete();

        self.emit(JobEvent::Completed {
            id: id.clone(),
            duration_ms,
            at: now,
        });
        Ok(())
    }

    async fn report_failure(
        &self,
        id: &JobId,
        token: &LockToken,
        error: String,
        retryable: bool,
    ) -> QueueResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        Self::verify_lock(record, token)?;

        if retryable && record.attempts_made < record.spec.max_attempts {
            let backoff = record.spec.backoff.unwrap_or(self.config.backoff);
            let delay = backoff.delay(record.attempts_made);
            let retry_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
            record.delay_retry(retry_at, error.clone());

            self.emit(JobEvent::Retrying {
                id: id.clone(),
                retry_at,
                error,
                at: now,
            });
        } else {
            let message = if retryable {
                format!("max attempts reached: {}", error)
            } else {
                error
            };
            record.fail(message.clone());

            self.emit(JobEvent::Failed {
                id: id.clone(),
                error: message,
                at: now,
            });
        }
        Ok(())
    }

    async fn report_progress(&self, id: &JobId, token: &LockToken, percent: u8) -> QueueResult<()> {
        let mut inner = self.inner.write();
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        Self::verify_lock(record, token)?;
        record.progress = percent.min(100);
        record.updated_at = Utc::now();

        self.emit(JobEvent::Progress {
            id: id.clone(),
            percent: percent.min(100),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn release(&self, id: &JobId) -> QueueResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        if !matches!(record.state, JobState::Active { .. }) {
            return Err(QueueError::JobNotFound(id.to_string()));
        }

        // The abandoned attempt is refunded; the job comes back after one
        // backoff step rather than immediately
        let backoff = record.spec.backoff.unwrap_or(self.config.backoff);
        let retry_at =
            now + chrono::Duration::from_std(backoff.delay(record.attempts_made)).unwrap_or_default();
        record.requeue();
        record.state = JobState::Delayed { until: retry_at };
        record.scheduled_at = retry_at;

        self.emit(JobEvent::Retrying {
            id: id.clone(),
            retry_at,
            error: "released by worker".to_string(),
            at: now,
        });
        Ok(())
    }

    async fn remove(&self, id: &JobId) -> QueueResult<()> {
        let mut inner = self.inner.write();
        let record = inner
            .jobs
            .get(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        if matches!(record.state, JobState::Active { .. }) {
            return Err(QueueError::JobActive(id.to_string()));
        }

        let key = record.spec.idempotency_key.clone();
        inner.jobs.remove(id);
        inner.ready.retain(|entry| entry != id);
        if let Some(key) = key {
            if inner.idempotency.get(&key) == Some(id) {
                inner.idempotency.remove(&key);
            }
        }

        self.emit(JobEvent::Removed {
            id: id.clone(),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn retry(&self, id: &JobId) -> QueueResult<()> {
        let mut inner = self.inner.write();
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        if !matches!(record.state, JobState::Failed { .. }) {
            return Err(QueueError::JobNotRetryable(id.to_string()));
        }

        record.reset_for_retry();
        let kind = record.spec.kind.clone();
        Self::insert_ready(&mut inner, id.clone());

        self.emit(JobEvent::Enqueued {
            id: id.clone(),
            kind,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn drain(&self) -> QueueResult<usize> {
        let mut inner = self.inner.write();
        let doomed: Vec<JobId> = inner
            .jobs
            .iter()
            .filter_map(|(id, record)| match record.state {
                JobState::Waiting | JobState::Delayed { .. } => Some(id.clone()),
                _ => None,
            })
            .collect();

        for id in &doomed {
            if let Some(record) = inner.jobs.remove(id) {
                if let Some(key) = record.spec.idempotency_key {
                    if inner.idempotency.get(&key) == Some(id) {
                        inner.idempotency.remove(&key);
                    }
                }
            }
        }
        inner.ready.clear();
        Ok(doomed.len())
    }

    async fn get(&self, id: &JobId) -> QueueResult<JobRecord<K>> {
        let inner = self.inner.read();
        inner
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    async fn jobs_by_state(&self, state: StateKind) -> QueueResult<Vec<JobRecord<K>>> {
        let inner = self.inner.read();
        let mut matching: Vec<JobRecord<K>> = inner
            .jobs
            .values()
            .filter(|record| record.state.kind() == state)
            .cloned()
            .collect();
        matching.sort_by_key(|record| (record.spec.priority, record.created_at));
        Ok(matching)
    }

    async fn counts(&self) -> QueueResult<StateCounts> {
        let inner = self.inner.read();
        let mut counts = StateCounts::default();
        for record in inner.jobs.values() {
            match record.state.kind() {
                StateKind::Waiting => counts.waiting += 1,
                StateKind::Delayed => counts.delayed += 1,
                StateKind::Active => counts.active += 1,
                StateKind::Completed => counts.completed += 1,
                StateKind::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    async fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn reap_expired_locks(&self) -> QueueResult<usize> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let expired: Vec<JobId> = inner
            .jobs
            .iter()
            .filter_map(|(id, record)| record.lock_expired(now).then(|| id.clone()))
            .collect();

        for id in &expired {
            let Some(record) = inner.jobs.get_mut(id) else {
                continue;
            };
            record.stalled_count += 1;
            let stalled_count = record.stalled_count;
            self.emit(JobEvent::Stalled {
                id: id.clone(),
                stalled_count,
                at: now,
            });

            if stalled_count > self.config.max_stalled_count {
                let message = format!(
                    "lock expired {} times without completion, giving up",
                    stalled_count
                );
                record.fail(message.clone());
                self.emit(JobEvent::Failed {
                    id: id.clone(),
                    error: message,
                    at: now,
                });
            } else {
                // A stall is not a processing attempt; the refunded job goes
                // straight back to waiting
                record.requeue();
                record.last_error = Some("lock expired".to_string());
                Self::insert_ready(&mut inner, id.clone());
            }
        }
        Ok(expired.len())
    }

    async fn promote_due(&self) -> QueueResult<usize> {
        let mut inner = self.inner.write();
        Ok(self.promote_locked(&mut inner, Utc::now()))
    }

    async fn purge_terminal(
        &self,
        completed: &RetentionPolicy,
        failed: &RetentionPolicy,
    ) -> QueueResult<usize> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let mut purged = Vec::new();

        for (state, policy) in [(StateKind::Completed, completed), (StateKind::Failed, failed)] {
            let mut terminal: Vec<(JobId, chrono::DateTime<chrono::Utc>)> = inner
                .jobs
                .iter()
                .filter(|(_, record)| record.state.kind() == state)
                .filter_map(|(id, record)| record.terminal_at().map(|at| (id.clone(), at)))
                .collect();
            terminal.sort_by_key(|(_, at)| *at);

            let max_age = chrono::Duration::from_std(policy.max_age).unwrap_or_default();
            let keep_from = terminal.len().saturating_sub(policy.max_count);
            for (index, (id, at)) in terminal.iter().enumerate() {
                if now - *at > max_age || index < keep_from {
                    purged.push(id.clone());
                }
            }
        }

        for id in &purged {
            if let Some(record) = inner.jobs.remove(id) {
                if let Some(key) = record.spec.idempotency_key {
                    if inner.idempotency.get(&key) == Some(id) {
                        inner.idempotency.remove(&key);
                    }
                }
            }
        }
        Ok(purged.len())
    }

    fn event_stream(&self) -> BoxStream<JobEvent<K>> {
        let receiver = self.events.subscribe();
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};
        Box::pin(BroadcastStream::new(receiver).filter_map(|result| result.ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackoffPolicy;

    fn test_spec() -> JobSpec<String> {
        JobSpec::new("sync".to_string())
    }

    fn test_store() -> MemoryStore<String> {
        MemoryStore::new(QueueConfig::default())
    }

    #[tokio::test]
    async fn enqueue_then_claim() {
        let store = test_store();
        let id = store.enqueue(test_spec()).await.unwrap();

        let claimed = store.claim().await.unwrap().unwrap();
        assert_eq!(claimed.record.id, id);
        assert_eq!(claimed.record.attempts_made, 1);
        assert!(matches!(claimed.record.state, JobState::Active { .. }));
    }

    #[tokio::test]
    async fn claim_order_is_priority_then_fifo() {
        let store = test_store();
        let low = store.enqueue(test_spec().with_priority(3)).await.unwrap();
        let high = store.enqueue(test_spec().with_priority(1)).await.unwrap();
        let medium = store.enqueue(test_spec().with_priority(2)).await.unwrap();

        assert_eq!(store.claim().await.unwrap().unwrap().record.id, high);
        assert_eq!(store.claim().await.unwrap().unwrap().record.id, medium);
        assert_eq!(store.claim().await.unwrap().unwrap().record.id, low);
    }

    #[tokio::test]
    async fn in_flight_idempotency_key_is_rejected() {
        let store = test_store();
        store
            .enqueue(test_spec().with_idempotency_key("events:sync"))
            .await
            .unwrap();

        let result = store
            .enqueue(test_spec().with_idempotency_key("events:sync"))
            .await;
        assert!(matches!(result, Err(QueueError::DuplicateJob(_))));
    }

    #[tokio::test]
    async fn idempotency_key_reusable_after_terminal() {
        let store = test_store();
        store
            .enqueue(test_spec().with_idempotency_key("events:sync"))
            .await
            .unwrap();
        let claimed = store.claim().await.unwrap().unwrap();
        store
            .report_success(claimed.id(), &claimed.lock_token)
            .await
            .unwrap();

        let second = store
            .enqueue(test_spec().with_idempotency_key("events:sync"))
            .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn retryable_failure_is_delayed_then_promoted() {
        let store = MemoryStore::new(QueueConfig {
            backoff: BackoffPolicy::new(Duration::from_millis(10), Duration::from_secs(1)),
            ..QueueConfig::default()
        });
        let id = store.enqueue(test_spec()).await.unwrap();

        let claimed = store.claim().await.unwrap().unwrap();
        store
            .report_failure(claimed.id(), &claimed.lock_token, "boom".into(), true)
            .await
            .unwrap();

        let record = store.get(&id).await.unwrap();
        assert!(matches!(record.state, JobState::Delayed { .. }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let reclaimed = store.claim().await.unwrap().unwrap();
        assert_eq!(reclaimed.record.id, id);
        assert_eq!(reclaimed.record.attempts_made, 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_become_terminal_failed() {
        let store = test_store();
        let id = store
            .enqueue(test_spec().with_max_attempts(1))
            .await
            .unwrap();

        let claimed = store.claim().await.unwrap().unwrap();
        store
            .report_failure(claimed.id(), &claimed.lock_token, "boom".into(), true)
            .await
            .unwrap();

        let record = store.get(&id).await.unwrap();
        assert!(matches!(record.state, JobState::Failed { .. }));
        assert!(record.attempts_made <= record.spec.max_attempts);
    }

    #[tokio::test]
    async fn non_retryable_failure_skips_backoff() {
        let store = test_store();
        let id = store.enqueue(test_spec()).await.unwrap();

        let claimed = store.claim().await.unwrap().unwrap();
        store
            .report_failure(claimed.id(), &claimed.lock_token, "bad payload".into(), false)
            .await
            .unwrap();

        let record = store.get(&id).await.unwrap();
        assert!(matches!(record.state, JobState::Failed { .. }));
        assert_eq!(record.last_error.as_deref(), Some("bad payload"));
    }

    #[tokio::test]
    async fn stale_lock_token_cannot_ack() {
        let store = test_store();
        store.enqueue(test_spec()).await.unwrap();
        let claimed = store.claim().await.unwrap().unwrap();

        let result = store
            .report_success(claimed.id(), &LockToken::from("bogus"))
            .await;
        assert!(matches!(result, Err(QueueError::InvalidLockToken)));
    }

    #[tokio::test]
    async fn expired_lock_cannot_ack() {
        let store = test_store();
        store.enqueue(test_spec()).await.unwrap();
        let claimed = store.claim().await.unwrap().unwrap();
        store.force_lock_expiry(claimed.id());

        let result = store.report_success(claimed.id(), &claimed.lock_token).await;
        assert!(matches!(result, Err(QueueError::LockExpired)));
    }

    #[tokio::test]
    async fn reaper_requeues_stalled_job_once() {
        let store = test_store();
        let id = store.enqueue(test_spec()).await.unwrap();
        let claimed = store.claim().await.unwrap().unwrap();
        store.force_lock_expiry(claimed.id());

        let reclaimed = store.reap_expired_locks().await.unwrap();
        assert_eq!(reclaimed, 1);

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.state, JobState::Waiting);
        assert_eq!(record.stalled_count, 1);
        // The stalled attempt was refunded
        assert_eq!(record.attempts_made, 0);
    }

    #[tokio::test]
    async fn repeated_stalls_become_terminal_failed() {
        let store = MemoryStore::new(QueueConfig {
            max_stalled_count: 1,
            ..QueueConfig::default()
        });
        let id = store.enqueue(test_spec()).await.unwrap();

        for _ in 0..2 {
            if let Some(claimed) = store.claim().await.unwrap() {
                store.force_lock_expiry(claimed.id());
            }
            store.reap_expired_locks().await.unwrap();
        }

        let record = store.get(&id).await.unwrap();
        assert!(matches!(record.state, JobState::Failed { .. }));
    }

    #[tokio::test]
    async fn rate_limit_caps_claims_per_window() {
        let store = MemoryStore::new(QueueConfig {
            rate_limit: Some(crate::RateLimit {
                max: 2,
                duration: Duration::from_secs(60),
            }),
            ..QueueConfig::default()
        });
        for _ in 0..5 {
            store.enqueue(test_spec()).await.unwrap();
        }

        assert!(store.claim().await.unwrap().is_some());
        assert!(store.claim().await.unwrap().is_some());
        assert!(store.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pause_blocks_claims_but_not_acks() {
        let store = test_store();
        store.enqueue(test_spec()).await.unwrap();
        let claimed = store.claim().await.unwrap().unwrap();

        store.enqueue(test_spec()).await.unwrap();
        JobStore::pause(&store).await;
        assert!(store.claim().await.unwrap().is_none());

        // The in-flight job can still complete
        store
            .report_success(claimed.id(), &claimed.lock_token)
            .await
            .unwrap();

        store.resume().await;
        assert!(store.claim().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_rejects_active_jobs() {
        let store = test_store();
        store.enqueue(test_spec()).await.unwrap();
        let claimed = store.claim().await.unwrap().unwrap();

        let result = store.remove(claimed.id()).await;
        assert!(matches!(result, Err(QueueError::JobActive(_))));
    }

    #[tokio::test]
    async fn drain_clears_waiting_but_not_active() {
        let store = test_store();
        store.enqueue(test_spec()).await.unwrap();
        let claimed = store.claim().await.unwrap().unwrap();
        store.enqueue(test_spec()).await.unwrap();
        store
            .enqueue(test_spec().with_delay(Duration::from_secs(60)))
            .await
            .unwrap();

        let dropped = store.drain().await.unwrap();
        assert_eq!(dropped, 2);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.waiting, 0);
        assert_eq!(counts.delayed, 0);
        assert_eq!(counts.active, 1);
        assert!(store.get(claimed.id()).await.is_ok());
    }

    #[tokio::test]
    async fn retry_resets_failed_job() {
        let store = test_store();
        let id = store
            .enqueue(test_spec().with_max_attempts(1))
            .await
            .unwrap();
        let claimed = store.claim().await.unwrap().unwrap();
        store
            .report_failure(claimed.id(), &claimed.lock_token, "boom".into(), true)
            .await
            .unwrap();

        store.retry(&id).await.unwrap();
        let record = store.get(&id).await.unwrap();
        assert_eq!(record.state, JobState::Waiting);
        assert_eq!(record.attempts_made, 0);
    }

    #[tokio::test]
    async fn purge_respects_count_and_age() {
        let store = test_store();
        for _ in 0..3 {
            store.enqueue(test_spec()).await.unwrap();
            let claimed = store.claim().await.unwrap().unwrap();
            store
                .report_success(claimed.id(), &claimed.lock_token)
                .await
                .unwrap();
        }

        let keep_one = RetentionPolicy::new(1, Duration::from_secs(3600));
        let keep_all = RetentionPolicy::new(100, Duration::from_secs(3600));
        let purged = store.purge_terminal(&keep_one, &keep_all).await.unwrap();
        assert_eq!(purged, 2);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
    }

    #[tokio::test]
    async fn bulk_enqueue_reports_partial_failure() {
        let store = test_store();
        let specs = vec![
            test_spec().with_idempotency_key("dup"),
            test_spec(),
            test_spec().with_idempotency_key("dup"),
        ];

        let result = store.enqueue_bulk(specs).await.unwrap();
        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, 2);
    }
}
