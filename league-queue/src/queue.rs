use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::maintenance::{Maintenance, MaintenanceHandle};
use crate::schedule::{Schedule, ScheduleRegistry, Scheduler, SchedulerHandle};
use crate::store::memory::MemoryStore;
use crate::store::{BoxStream, BulkEnqueueResult, JobStore};
use crate::{
    JobEvent, JobId, JobKind, JobRecord, JobSpec, QueueConfig, QueueResult, StateCounts, StateKind,
};

/// Named durable queue facade. Wraps a `JobStore` with configuration and
/// the recurring-schedule registry; workers bind to it for claims and
/// callers use it for enqueue/inspection/control.
pub struct Queue<K: JobKind> {
    name: String,
    store: Arc<dyn JobStore<K>>,
    config: QueueConfig,
    schedules: Arc<ScheduleRegistry<K>>,
}

impl<K: JobKind> Clone for Queue<K> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            schedules: self.schedules.clone(),
        }
    }
}

/// Handles for the queue's background tasks, released together on shutdown
pub struct QueueTasks {
    maintenance: MaintenanceHandle,
    scheduler: SchedulerHandle,
}

impl QueueTasks {
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.maintenance.shutdown().await;
    }
}

impl<K: JobKind> Queue<K> {
    pub fn new(name: impl Into<String>, store: Arc<dyn JobStore<K>>, config: QueueConfig) -> Self {
        Self {
            name: name.into(),
            store,
            config,
            schedules: Arc::new(ScheduleRegistry::new()),
        }
    }

    /// Queue backed by the in-memory store
    pub fn in_memory(name: impl Into<String>, config: QueueConfig) -> Self {
        let store = Arc::new(MemoryStore::new(config.clone()));
        Self::new(name, store, config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Store handle for workers binding to this queue
    pub fn store(&self) -> Arc<dyn JobStore<K>> {
        self.store.clone()
    }

    pub async fn enqueue(&self, spec: JobSpec<K>) -> QueueResult<JobId> {
        let id = self.store.enqueue(spec).await?;
        info!(queue = %self.name, job_id = %id, "enqueued job");
        Ok(id)
    }

    pub async fn enqueue_bulk(&self, specs: Vec<JobSpec<K>>) -> QueueResult<BulkEnqueueResult> {
        self.store.enqueue_bulk(specs).await
    }

    pub async fn get(&self, id: &JobId) -> QueueResult<JobRecord<K>> {
        self.store.get(id).await
    }

    pub async fn jobs_by_state(&self, state: StateKind) -> QueueResult<Vec<JobRecord<K>>> {
        self.store.jobs_by_state(state).await
    }

    pub async fn counts(&self) -> QueueResult<StateCounts> {
        self.store.counts().await
    }

    pub async fn remove(&self, id: &JobId) -> QueueResult<()> {
        self.store.remove(id).await
    }

    pub async fn retry(&self, id: &JobId) -> QueueResult<()> {
        self.store.retry(id).await
    }

    pub async fn drain(&self) -> QueueResult<usize> {
        let dropped = self.store.drain().await?;
        info!(queue = %self.name, dropped, "drained queue");
        Ok(dropped)
    }

    /// Stop new claims; in-flight jobs finish normally
    pub async fn pause(&self) {
        self.store.pause().await;
        info!(queue = %self.name, "queue paused");
    }

    pub async fn resume(&self) {
        self.store.resume().await;
        info!(queue = %self.name, "queue resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.store.is_paused()
    }

    /// Register or replace a recurring job
    pub fn upsert_schedule(
        &self,
        schedule_id: impl Into<String>,
        schedule: Schedule,
        template: JobSpec<K>,
    ) {
        self.schedules.upsert(schedule_id, schedule, template);
    }

    pub fn remove_schedule(&self, schedule_id: &str) -> bool {
        self.schedules.remove(schedule_id)
    }

    pub fn schedule_ids(&self) -> Vec<String> {
        self.schedules.ids()
    }

    /// Lifecycle event stream for observers
    pub fn events(&self) -> BoxStream<JobEvent<K>> {
        self.store.event_stream()
    }

    /// Spawn the maintenance loop and the recurring-job scheduler
    pub fn start_tasks(
        &self,
        maintenance_interval: Duration,
        scheduler_interval: Duration,
    ) -> QueueTasks {
        let maintenance = Maintenance::new(
            self.store.clone(),
            self.config.retention_completed,
            self.config.retention_failed,
        )
        .with_interval(maintenance_interval)
        .spawn();

        let scheduler = Scheduler::new(self.store.clone(), self.schedules.clone())
            .with_interval(scheduler_interval)
            .spawn();

        QueueTasks {
            maintenance,
            scheduler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn facade_round_trip() {
        let queue: Queue<String> = Queue::in_memory("reference-data", QueueConfig::default());
        let id = queue.enqueue(JobSpec::new("sync".to_string())).await.unwrap();

        let record = queue.get(&id).await.unwrap();
        assert_eq!(record.spec.kind, "sync");

        let waiting = queue.jobs_by_state(StateKind::Waiting).await.unwrap();
        assert_eq!(waiting.len(), 1);

        queue.remove(&id).await.unwrap();
        assert!(queue.get(&id).await.is_err());
    }
}
