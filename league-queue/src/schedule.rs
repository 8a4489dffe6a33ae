use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::store::JobStore;
use crate::{JobKind, JobSpec, QueueError, QueueResult};

/// When a recurring job fires
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Cron expression (seconds-resolution, UTC)
    Cron(cron::Schedule),

    /// Fixed interval from the previous run
    Every(Duration),
}

impl Schedule {
    pub fn cron(expr: &str) -> QueueResult<Self> {
        cron::Schedule::from_str(expr)
            .map(Self::Cron)
            .map_err(|err| QueueError::InvalidCron(format!("{}: {}", expr, err)))
    }

    pub fn every(duration: Duration) -> Self {
        Self::Every(duration)
    }

    /// Next fire time strictly after `after`
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&after).next(),
            Self::Every(duration) => {
                Some(after + chrono::Duration::from_std(*duration).unwrap_or_default())
            }
        }
    }
}

struct ScheduleEntry<K> {
    schedule: Schedule,
    template: JobSpec<K>,
    next_run: DateTime<Utc>,
}

/// Registry of recurring jobs keyed by schedule id. Re-registering an id
/// replaces the entry instead of duplicating it.
pub struct ScheduleRegistry<K> {
    entries: RwLock<HashMap<String, ScheduleEntry<K>>>,
}

impl<K: JobKind> ScheduleRegistry<K> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, schedule_id: impl Into<String>, schedule: Schedule, template: JobSpec<K>) {
        let schedule_id = schedule_id.into();
        let next_run = schedule
            .next_run(Utc::now())
            .unwrap_or_else(|| Utc::now() + chrono::Duration::days(365));
        debug!(schedule_id = %schedule_id, next_run = %next_run, "registered schedule");
        self.entries.write().insert(
            schedule_id,
            ScheduleEntry {
                schedule,
                template,
                next_run,
            },
        );
    }

    pub fn remove(&self, schedule_id: &str) -> bool {
        self.entries.write().remove(schedule_id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Collect templates due at `now` and advance their next fire time
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<(String, JobSpec<K>)> {
        let mut due = Vec::new();
        let mut entries = self.entries.write();
        for (id, entry) in entries.iter_mut() {
            if entry.next_run <= now {
                due.push((id.clone(), entry.template.clone()));
                entry.next_run = entry
                    .schedule
                    .next_run(now)
                    .unwrap_or_else(|| now + chrono::Duration::days(365));
            }
        }
        due
    }
}

impl<K: JobKind> Default for ScheduleRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives due schedules into enqueues on a fixed cadence
pub struct Scheduler<K: JobKind> {
    store: Arc<dyn JobStore<K>>,
    registry: Arc<ScheduleRegistry<K>>,
    interval: Duration,
}

/// Handle for shutting the scheduler task down
pub struct SchedulerHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join_handle.await;
    }
}

impl<K: JobKind> Scheduler<K> {
    pub fn new(store: Arc<dyn JobStore<K>>, registry: Arc<ScheduleRegistry<K>>) -> Self {
        Self {
            store,
            registry,
            interval: Duration::from_secs(1),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enqueue everything due at `now`. Exposed for deterministic tests.
    pub async fn tick(&self, now: DateTime<Utc>) {
        for (schedule_id, template) in self.registry.take_due(now) {
            match self.store.enqueue(template).await {
                Ok(job_id) => {
                    debug!(schedule_id = %schedule_id, job_id = %job_id, "enqueued recurring job")
                }
                // The previous occurrence is still in flight; skip this one
                Err(QueueError::DuplicateJob(key)) => {
                    debug!(schedule_id = %schedule_id, key = %key, "recurring job still in flight, skipped")
                }
                Err(err) => warn!(schedule_id = %schedule_id, %err, "recurring enqueue failed"),
            }
        }
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            info!(interval = ?self.interval, "scheduler started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("scheduler shutdown requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick(Utc::now()).await;
                    }
                }
            }
        });

        SchedulerHandle {
            shutdown_tx,
            join_handle,
        }
    }
}
