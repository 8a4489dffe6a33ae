use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::queue::Queue;
use crate::store::JobStore;
use crate::{ClaimedJob, JobId, JobKind, LockToken};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum simultaneously active jobs
    pub concurrency: usize,
    /// Idle sleep between claim attempts
    pub poll_interval: Duration,
    /// How often an active job's lock is renewed
    pub lock_renew_interval: Duration,
    /// How far each renewal pushes the lock deadline
    pub lock_renew_extend: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(100),
            lock_renew_interval: Duration::from_secs(10),
            lock_renew_extend: Duration::from_secs(30),
        }
    }
}

struct ActiveJob<K: JobKind> {
    store: Arc<dyn JobStore<K>>,
    abort: AbortHandle,
}

struct Shared<K: JobKind> {
    running: AtomicBool,
    paused: AtomicBool,
    target_concurrency: AtomicUsize,
    active: AtomicUsize,
    claim_cursor: AtomicUsize,
    active_jobs: Mutex<HashMap<JobId, ActiveJob<K>>>,
    main_task: Mutex<Option<JoinHandle<()>>>,
}

/// Stops the lock heartbeat, decrements the active count, and deregisters
/// the job when the processing task ends - including when it is aborted
/// mid-flight, so an abandoned job's lock is left to expire instead of
/// being renewed forever.
struct ActiveGuard<K: JobKind> {
    shared: Arc<Shared<K>>,
    id: JobId,
    heartbeat: AbortHandle,
}

impl<K: JobKind> Drop for ActiveGuard<K> {
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.shared.active.fetch_sub(1, Ordering::SeqCst);
        self.shared.active_jobs.lock().remove(&self.id);
    }
}

/// Process-local executor bound to one or more queues. Claims jobs up to
/// its concurrency limit, resolves handlers through the dispatcher, and
/// reports outcomes back to the store - the worker itself never decides
/// retry counts.
///
/// Several workers may bind to the same queue for horizontal throughput,
/// and one worker may bind several queues for fan-out; both compositions
/// run through this single claim loop.
pub struct Worker<K: JobKind, C: Clone + Send + Sync + 'static> {
    queues: Vec<Queue<K>>,
    dispatcher: Arc<Dispatcher<K, C>>,
    ctx: C,
    config: WorkerConfig,
    shared: Arc<Shared<K>>,
}

impl<K: JobKind, C: Clone + Send + Sync + 'static> Clone for Worker<K, C> {
    fn clone(&self) -> Self {
        Self {
            queues: self.queues.clone(),
            dispatcher: self.dispatcher.clone(),
            ctx: self.ctx.clone(),
            config: self.config.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<K: JobKind, C: Clone + Send + Sync + 'static> Worker<K, C> {
    pub fn new(
        queues: Vec<Queue<K>>,
        dispatcher: Dispatcher<K, C>,
        ctx: C,
        config: WorkerConfig,
    ) -> Self {
        let concurrency = config.concurrency;
        Self {
            queues,
            dispatcher: Arc::new(dispatcher),
            ctx,
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                target_concurrency: AtomicUsize::new(concurrency),
                active: AtomicUsize::new(0),
                claim_cursor: AtomicUsize::new(0),
                active_jobs: Mutex::new(HashMap::new()),
                main_task: Mutex::new(None),
            }),
        }
    }

    /// Spawn the claim loop. Idempotent: a second call is a no-op.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let worker = self.clone();
        let handle = tokio::spawn(worker.run_loop());
        *self.shared.main_task.lock() = Some(handle);
        info!(queues = self.queues.len(), "worker started");
    }

    /// Graceful shutdown: stop claiming, wait for active jobs to finish.
    /// Idempotent.
    pub async fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let handle = self.shared.main_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        while self.shared.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        info!("worker stopped");
    }

    /// Immediate termination: abort the claim loop and every active job
    /// task. Abandoned locks expire and maintenance requeues the jobs.
    pub fn close(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.shared.main_task.lock().take() {
            handle.abort();
        }
        let jobs: Vec<(JobId, ActiveJob<K>)> = self.shared.active_jobs.lock().drain().collect();
        for (id, job) in jobs {
            job.abort.abort();
            debug!(job_id = %id, "aborted active job on close");
        }
        info!("worker closed");
    }

    /// Stop claiming new jobs. With `immediate`, currently-processing jobs
    /// are abandoned back to the queue and will be retried per backoff;
    /// otherwise they finish first.
    pub async fn pause(&self, immediate: bool) {
        self.shared.paused.store(true, Ordering::SeqCst);
        if immediate {
            let jobs: Vec<(JobId, ActiveJob<K>)> = self.shared.active_jobs.lock().drain().collect();
            for (id, job) in jobs {
                job.abort.abort();
                if let Err(err) = job.store.release(&id).await {
                    warn!(job_id = %id, %err, "failed to release abandoned job");
                } else {
                    info!(job_id = %id, "abandoned job back to queue");
                }
            }
        }
        info!(immediate, "worker paused");
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        info!("worker resumed");
    }

    /// Adjust the concurrency cap at runtime. Active jobs beyond a lowered
    /// cap finish normally; no new claims happen until under it.
    pub fn set_concurrency(&self, concurrency: usize) {
        self.shared
            .target_concurrency
            .store(concurrency, Ordering::SeqCst);
    }

    pub fn concurrency(&self) -> usize {
        self.shared.target_concurrency.load(Ordering::SeqCst)
    }

    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    async fn run_loop(self) {
        loop {
            if !self.shared.running.load(Ordering::SeqCst) {
                break;
            }
            let at_capacity = self.shared.active.load(Ordering::SeqCst)
                >= self.shared.target_concurrency.load(Ordering::SeqCst);
            if self.shared.paused.load(Ordering::SeqCst) || at_capacity {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            // Rotate the starting queue so a busy first queue cannot
            // starve the later ones in the fan-out composition
            let start = self.shared.claim_cursor.fetch_add(1, Ordering::SeqCst);
            let mut claimed = None;
            for offset in 0..self.queues.len() {
                let queue = &self.queues[start.wrapping_add(offset) % self.queues.len()];
                match queue.store().claim().await {
                    Ok(Some(job)) => {
                        claimed = Some((job, queue.store()));
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        error!(queue = queue.name(), %err, "claim failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }

            match claimed {
                Some((job, store)) => self.spawn_job(job, store),
                None => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }

    fn spawn_job(&self, job: ClaimedJob<K>, store: Arc<dyn JobStore<K>>) {
        self.shared.active.fetch_add(1, Ordering::SeqCst);
        let id = job.id().clone();
        let handle = tokio::spawn(process_job(
            self.shared.clone(),
            store.clone(),
            self.dispatcher.clone(),
            self.ctx.clone(),
            self.config.clone(),
            job,
        ));

        let abort = handle.abort_handle();
        if !handle.is_finished() {
            self.shared
                .active_jobs
                .lock()
                .insert(id.clone(), ActiveJob { store, abort });
            // The task may have finished between the check and the insert
            if handle.is_finished() {
                self.shared.active_jobs.lock().remove(&id);
            }
        }
    }
}

async fn process_job<K: JobKind, C: Clone + Send + Sync + 'static>(
    shared: Arc<Shared<K>>,
    store: Arc<dyn JobStore<K>>,
    dispatcher: Arc<Dispatcher<K, C>>,
    ctx: C,
    config: WorkerConfig,
    job: ClaimedJob<K>,
) {
    let id = job.id().clone();
    let token = job.lock_token.clone();
    let heartbeat = spawn_heartbeat(
        store.clone(),
        id.clone(),
        token.clone(),
        config.lock_renew_interval,
        config.lock_renew_extend,
    );
    let _guard = ActiveGuard {
        shared,
        id: id.clone(),
        heartbeat,
    };

    debug!(job_id = %id, kind = %job.record.spec.kind, attempt = job.record.attempts_made, "processing job");
    let result = dispatcher.dispatch(&job.record, &ctx).await;

    match result {
        Ok(()) => {
            if let Err(err) = store.report_success(&id, &token).await {
                warn!(job_id = %id, %err, "success acknowledgment rejected");
            } else {
                debug!(job_id = %id, "job completed");
            }
        }
        Err(job_err) => {
            let retryable = job_err.is_retryable();
            if let Err(err) = store
                .report_failure(&id, &token, job_err.to_string(), retryable)
                .await
            {
                warn!(job_id = %id, %err, "failure acknowledgment rejected");
            } else if retryable {
                warn!(job_id = %id, error = %job_err, "job failed, queue will classify retry");
            } else {
                error!(job_id = %id, error = %job_err, "job failed terminally");
            }
        }
    }
}

/// Keeps a long-running job's lock alive. The processing task's guard
/// aborts the renewal task when the job ends, and renewal is additionally
/// self-terminating: once the job is acknowledged or released the store
/// rejects it and the loop exits.
fn spawn_heartbeat<K: JobKind>(
    store: Arc<dyn JobStore<K>>,
    id: JobId,
    token: LockToken,
    every: Duration,
    extend: Duration,
) -> AbortHandle {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            if let Err(err) = store.renew_lock(&id, &token, extend).await {
                debug!(job_id = %id, %err, "lock renewal stopped");
                break;
            }
        }
    })
    .abort_handle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::{
        BackoffPolicy, JobError, JobHandler, JobRecord, JobSpec, JobState, QueueConfig, StateKind,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    #[derive(Clone)]
    struct TestCtx {
        seen: Arc<Mutex<Vec<i32>>>,
        failures_left: Arc<AtomicU32>,
    }

    impl TestCtx {
        fn new(failures: u32) -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                failures_left: Arc::new(AtomicU32::new(failures)),
            }
        }
    }

    struct RecordingHandler;

    #[async_trait]
    impl JobHandler<String, TestCtx> for RecordingHandler {
        async fn run(&self, job: &JobRecord<String>, ctx: &TestCtx) -> Result<(), JobError> {
            ctx.seen.lock().push(job.spec.priority);
            Ok(())
        }
    }

    struct FlakyHandler;

    #[async_trait]
    impl JobHandler<String, TestCtx> for FlakyHandler {
        async fn run(&self, _job: &JobRecord<String>, ctx: &TestCtx) -> Result<(), JobError> {
            let remaining = ctx.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                ctx.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(JobError::processing("upstream fetch failed"));
            }
            Ok(())
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl JobHandler<String, TestCtx> for SlowHandler {
        async fn run(&self, _job: &JobRecord<String>, _ctx: &TestCtx) -> Result<(), JobError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn fast_config(concurrency: usize) -> WorkerConfig {
        WorkerConfig {
            concurrency,
            poll_interval: Duration::from_millis(5),
            ..WorkerConfig::default()
        }
    }

    fn queue_with(config: QueueConfig) -> Queue<String> {
        Queue::new(
            "test",
            Arc::new(MemoryStore::new(config.clone())),
            config,
        )
    }

    #[tokio::test]
    async fn processes_in_priority_order_with_concurrency_one() {
        let queue = queue_with(QueueConfig::default());
        for priority in [3, 1, 2] {
            queue
                .enqueue(JobSpec::new("sync".to_string()).with_priority(priority))
                .await
                .unwrap();
        }

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register("sync".to_string(), Arc::new(RecordingHandler))
            .unwrap();
        let ctx = TestCtx::new(0);
        let worker = Worker::new(vec![queue.clone()], dispatcher, ctx.clone(), fast_config(1));
        worker.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let counts = queue.counts().await.unwrap();
                if counts.completed == 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not complete in time");
        worker.stop().await;

        assert_eq!(*ctx.seen.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds_within_budget() {
        let queue = queue_with(QueueConfig {
            backoff: BackoffPolicy::new(Duration::from_millis(10), Duration::from_secs(30)),
            ..QueueConfig::default()
        });
        let id = queue
            .enqueue(JobSpec::new("sync".to_string()).with_max_attempts(3))
            .await
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register("sync".to_string(), Arc::new(FlakyHandler))
            .unwrap();
        let worker = Worker::new(
            vec![queue.clone()],
            dispatcher,
            TestCtx::new(2),
            fast_config(1),
        );
        worker.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let record = queue.get(&id).await.unwrap();
                if record.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not finish in time");
        worker.stop().await;

        let record = queue.get(&id).await.unwrap();
        assert!(matches!(record.state, JobState::Completed { .. }));
        assert_eq!(record.attempts_made, 3);
    }

    #[tokio::test]
    async fn validation_failure_is_terminal_on_first_attempt() {
        struct RejectingHandler;

        #[async_trait]
        impl JobHandler<String, TestCtx> for RejectingHandler {
            async fn run(&self, _job: &JobRecord<String>, _ctx: &TestCtx) -> Result<(), JobError> {
                Err(JobError::validation("malformed payload"))
            }
        }

        let queue = queue_with(QueueConfig::default());
        let id = queue.enqueue(JobSpec::new("sync".to_string())).await.unwrap();

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register("sync".to_string(), Arc::new(RejectingHandler))
            .unwrap();
        let worker = Worker::new(
            vec![queue.clone()],
            dispatcher,
            TestCtx::new(0),
            fast_config(1),
        );
        worker.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if queue.get(&id).await.unwrap().is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not finish in time");
        worker.stop().await;

        let record = queue.get(&id).await.unwrap();
        assert!(matches!(record.state, JobState::Failed { .. }));
        assert_eq!(record.attempts_made, 1);
    }

    #[tokio::test]
    async fn immediate_pause_abandons_active_job() {
        let queue = queue_with(QueueConfig::default());
        let id = queue.enqueue(JobSpec::new("sync".to_string())).await.unwrap();

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register("sync".to_string(), Arc::new(SlowHandler))
            .unwrap();
        let worker = Worker::new(
            vec![queue.clone()],
            dispatcher,
            TestCtx::new(0),
            fast_config(1),
        );
        worker.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            while worker.active_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job was never claimed");

        worker.pause(true).await;

        let record = queue.get(&id).await.unwrap();
        assert!(matches!(record.state, JobState::Delayed { .. }));
        // The abandoned attempt was refunded
        assert_eq!(record.attempts_made, 0);

        worker.close();
    }

    #[tokio::test]
    async fn one_worker_drains_multiple_queues() {
        let first = queue_with(QueueConfig::default());
        let second = queue_with(QueueConfig::default());
        first.enqueue(JobSpec::new("sync".to_string())).await.unwrap();
        second.enqueue(JobSpec::new("sync".to_string())).await.unwrap();

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register("sync".to_string(), Arc::new(RecordingHandler))
            .unwrap();
        let worker = Worker::new(
            vec![first.clone(), second.clone()],
            dispatcher,
            TestCtx::new(0),
            fast_config(2),
        );
        worker.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done = first.counts().await.unwrap().completed
                    + second.counts().await.unwrap().completed;
                if done == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not complete in time");
        worker.stop().await;

        assert_eq!(
            first.jobs_by_state(StateKind::Completed).await.unwrap().len(),
            1
        );
        assert_eq!(
            second.jobs_by_state(StateKind::Completed).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn closed_worker_leaves_lock_to_expire_for_recovery() {
        let queue = queue_with(QueueConfig {
            lock_duration: Duration::from_millis(200),
            ..QueueConfig::default()
        });
        let id = queue.enqueue(JobSpec::new("sync".to_string())).await.unwrap();

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register("sync".to_string(), Arc::new(SlowHandler))
            .unwrap();
        let config = WorkerConfig {
            lock_renew_interval: Duration::from_millis(50),
            lock_renew_extend: Duration::from_millis(200),
            ..fast_config(1)
        };
        let worker = Worker::new(vec![queue.clone()], dispatcher, TestCtx::new(0), config);
        worker.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            while worker.active_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job was never claimed");

        worker.close();

        // The abandoned job's heartbeat must die with the worker; once the
        // lock lapses, maintenance can requeue the job
        tokio::time::sleep(Duration::from_millis(600)).await;
        let reclaimed = queue.store().reap_expired_locks().await.unwrap();
        assert_eq!(reclaimed, 1);
        let record = queue.get(&id).await.unwrap();
        assert!(matches!(record.state, JobState::Waiting));
    }

    #[tokio::test]
    async fn claims_rotate_across_queues() {
        let first = queue_with(QueueConfig::default());
        let second = queue_with(QueueConfig::default());
        for _ in 0..3 {
            first
                .enqueue(JobSpec::new("sync".to_string()).with_priority(1))
                .await
                .unwrap();
        }
        second
            .enqueue(JobSpec::new("sync".to_string()).with_priority(2))
            .await
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register("sync".to_string(), Arc::new(RecordingHandler))
            .unwrap();
        let ctx = TestCtx::new(0);
        let worker = Worker::new(
            vec![first.clone(), second.clone()],
            dispatcher,
            ctx.clone(),
            fast_config(1),
        );
        worker.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done = first.counts().await.unwrap().completed
                    + second.counts().await.unwrap().completed;
                if done == 4 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not complete in time");
        worker.stop().await;

        // The second queue gets its turn on the second claim instead of
        // waiting for the first queue to run dry
        assert_eq!(*ctx.seen.lock(), vec![1, 2, 1, 1]);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let queue = queue_with(QueueConfig::default());
        let dispatcher: Dispatcher<String, TestCtx> = Dispatcher::new();
        let worker = Worker::new(vec![queue], dispatcher, TestCtx::new(0), fast_config(1));

        worker.start();
        worker.start();
        assert!(worker.is_running());
        worker.stop().await;
        assert!(!worker.is_running());
    }
}
