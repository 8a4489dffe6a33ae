use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use league_queue::{
    JobId, JobRecord, JobSpec, MetricsSample, Monitor, Queue, QueueError, QueueResult,
    QueueTasks, Schedule, StateKind, Worker,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SyncConfig;
use crate::deps::{Caches, Dependencies, SyncContext};
use crate::error::StoreError;
use crate::handlers::build_dispatcher;
use crate::job::{JobType, Operation, SyncPayload};
use crate::model::Team;

const BOOTSTRAP_SCHEDULE_ID: &str = "bootstrap_refresh";

/// Options for a one-off sync enqueue.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub op: Operation,
    pub target: Option<u32>,
    pub ids: Vec<u32>,
    pub force: bool,
    pub priority: i32,
    pub delay: Option<Duration>,
    pub idempotency_key: Option<String>,
}

impl EnqueueOptions {
    pub fn with_op(mut self, op: Operation) -> Self {
        self.op = op;
        self
    }

    pub fn with_target(mut self, event_id: u32) -> Self {
        self.target = Some(event_id);
        self
    }

    pub fn with_ids(mut self, ids: Vec<u32>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
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

/// Caller-facing job summary: enough to render a status page without
/// exposing queue internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub job_type: JobType,
    pub state: StateKind,
    pub attempts_made: u32,
    pub stalled_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

impl From<JobRecord<JobType>> for JobView {
    fn from(record: JobRecord<JobType>) -> Self {
        Self {
            id: record.id,
            job_type: record.spec.kind,
            state: record.state.kind(),
            attempts_made: record.attempts_made,
            stalled_count: record.stalled_count,
            last_error: record.last_error,
            created_at: record.created_at,
            scheduled_at: record.scheduled_at,
        }
    }
}

/// The whole sync backend behind one facade: queue, worker, monitor, and
/// cached reads. Lifecycle is explicit - [`connect`](Self::connect) starts
/// the background machinery, [`disconnect`](Self::disconnect) releases it.
pub struct SyncService {
    queue: Queue<JobType>,
    worker: Worker<JobType, SyncContext>,
    monitor: Monitor<JobType>,
    ctx: SyncContext,
    config: SyncConfig,
    tasks: Mutex<Option<QueueTasks>>,
    connected: AtomicBool,
}

impl SyncService {
    pub fn new(deps: Dependencies, config: SyncConfig) -> QueueResult<Self> {
        let deps = Arc::new(deps);
        let caches = Arc::new(Caches::new(deps.kv.clone(), &config.cache));
        let ctx = SyncContext { deps, caches };

        let queue = Queue::in_memory(config.queue_name.clone(), config.queue.clone());
        let dispatcher = build_dispatcher()?;
        let worker = Worker::new(
            vec![queue.clone()],
            dispatcher,
            ctx.clone(),
            config.worker.clone(),
        );
        let monitor = Monitor::new(queue.clone(), config.monitor.clone());

        Ok(Self {
            queue,
            worker,
            monitor,
            ctx,
            config,
            tasks: Mutex::new(None),
            connected: AtomicBool::new(false),
        })
    }

    /// Verify collaborators are reachable and start the worker, monitor,
    /// maintenance, and recurring schedules. Idempotent.
    pub async fn connect(&self) -> QueueResult<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.ctx.deps.kv.ping().await.map_err(|err| {
            self.connected.store(false, Ordering::SeqCst);
            QueueError::Internal(format!("key-value store unreachable: {err}"))
        })?;

        if let Some(every) = self.config.bootstrap_interval {
            self.queue.upsert_schedule(
                BOOTSTRAP_SCHEDULE_ID,
                Schedule::every(every),
                JobSpec::new(JobType::Bootstrap)
                    .with_payload(SyncPayload::default().to_value())
                    .with_idempotency_key(BOOTSTRAP_SCHEDULE_ID),
            );
        }

        let tasks = self.queue.start_tasks(
            self.config.maintenance_interval,
            self.config.scheduler_interval,
        );
        *self.tasks.lock() = Some(tasks);
        self.monitor.start();
        self.worker.start();

        info!(queue = self.queue.name(), "sync service connected");
        Ok(())
    }

    /// Graceful release in reverse order: stop claiming, finish active
    /// jobs, then tear down the background tasks. Idempotent.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        self.worker.stop().await;
        self.monitor.stop();
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }
        info!("sync service disconnected");
    }

    pub async fn enqueue_sync(
        &self,
        job_type: JobType,
        options: EnqueueOptions,
    ) -> QueueResult<JobId> {
        let payload = SyncPayload {
            op: options.op,
            target: options.target,
            ids: options.ids,
            force: options.force,
        };
        let mut spec = JobSpec::new(job_type)
            .with_payload(payload.to_value())
            .with_priority(options.priority);
        if let Some(delay) = options.delay {
            spec = spec.with_delay(delay);
        }
        if let Some(key) = options.idempotency_key {
            spec = spec.with_idempotency_key(key);
        }
        self.queue.enqueue(spec).await
    }

    pub async fn pending_jobs(&self) -> QueueResult<Vec<JobView>> {
        self.jobs_in(StateKind::Waiting).await
    }

    pub async fn delayed_jobs(&self) -> QueueResult<Vec<JobView>> {
        self.jobs_in(StateKind::Delayed).await
    }

    pub async fn active_jobs(&self) -> QueueResult<Vec<JobView>> {
        self.jobs_in(StateKind::Active).await
    }

    pub async fn completed_jobs(&self) -> QueueResult<Vec<JobView>> {
        self.jobs_in(StateKind::Completed).await
    }

    pub async fn failed_jobs(&self) -> QueueResult<Vec<JobView>> {
        self.jobs_in(StateKind::Failed).await
    }

    pub async fn job(&self, id: &JobId) -> QueueResult<JobView> {
        Ok(self.queue.get(id).await?.into())
    }

    /// Reset a failed job into the waiting state with a fresh retry budget.
    pub async fn retry_job(&self, id: &JobId) -> QueueResult<()> {
        self.queue.retry(id).await
    }

    /// Cancel a job that is not currently active.
    pub async fn remove_job(&self, id: &JobId) -> QueueResult<()> {
        self.queue.remove(id).await
    }

    /// Current aggregate metrics; `None` if the counts poll failed.
    pub async fn metrics(&self) -> Option<MetricsSample> {
        self.monitor.sample_now().await
    }

    pub fn metrics_history(&self) -> Vec<MetricsSample> {
        self.monitor.history()
    }

    /// Stop offering jobs to workers; active jobs finish.
    pub async fn pause(&self) {
        self.queue.pause().await;
    }

    pub async fn resume(&self) {
        self.queue.resume().await;
    }

    /// Cached team read; on a miss the source-of-truth store is consulted
    /// and the cache repopulated off the request path.
    pub async fn team(&self, id: u32) -> Result<Option<Team>, StoreError> {
        let deps = self.ctx.deps.clone();
        let key = id.to_string();
        let loader_key = key.clone();
        self.ctx
            .caches
            .teams
            .get_one(&key, || async move { deps.teams.find_by_id(&loader_key).await })
            .await
    }

    pub async fn teams(&self) -> Result<Vec<Team>, StoreError> {
        let deps = self.ctx.deps.clone();
        self.ctx
            .caches
            .teams
            .get_all(|| async move { deps.teams.find_all().await })
            .await
    }

    pub fn queue(&self) -> &Queue<JobType> {
        &self.queue
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    async fn jobs_in(&self, state: StateKind) -> QueueResult<Vec<JobView>> {
        Ok(self
            .queue
            .jobs_by_state(state)
            .await?
            .into_iter()
            .map(JobView::from)
            .collect())
    }
}
