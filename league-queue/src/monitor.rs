use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::queue::Queue;
use crate::types::{JobEvent, JobId, StateCounts, StateKind};
use crate::JobKind;

/// One-minute window for throughput and error-rate calculations.
const RATE_WINDOW: chrono::Duration = chrono::Duration::seconds(60);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often aggregate counts are sampled into history
    pub sample_interval: Duration,
    /// Ring-buffer capacity; 1440 minute-samples covers 24 hours
    pub history_size: usize,
    /// How many terminal per-job entries are retained before eviction
    pub max_job_entries: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(60),
            history_size: 1440,
            max_job_entries: 10_000,
        }
    }
}

/// Point-in-time aggregate snapshot, appended to the history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    pub counts: StateCounts,
    /// Mean handler duration over the last minute's completions
    pub avg_processing_ms: f64,
    /// Failures / (completions + failures) over the last minute
    pub error_rate: f64,
    pub throughput_per_min: usize,
}

/// Per-job trace folded from lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetrics {
    pub id: JobId,
    pub kind: String,
    pub status: StateKind,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub attempts: u32,
    pub stalled_count: u32,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, JobMetrics>,
    terminal_order: VecDeque<JobId>,
    history: VecDeque<MetricsSample>,
    completions: VecDeque<(DateTime<Utc>, u64)>,
    failures: VecDeque<DateTime<Utc>>,
}

impl Inner {
    fn apply<K: JobKind>(&mut self, event: JobEvent<K>, max_entries: usize) {
        match event {
            JobEvent::Enqueued { id, kind, at } => {
                self.jobs.insert(
                    id.clone(),
                    JobMetrics {
                        id,
                        kind: kind.to_string(),
                        status: StateKind::Waiting,
                        enqueued_at: at,
                        started_at: None,
                        duration_ms: None,
                        attempts: 0,
                        stalled_count: 0,
                        last_error: None,
                    },
                );
            }
            JobEvent::Active { id, at } => {
                if let Some(job) = self.jobs.get_mut(&id) {
                    job.status = StateKind::Active;
                    job.started_at = Some(at);
                    job.attempts += 1;
                }
            }
            JobEvent::Progress { .. } => {}
            JobEvent::Completed {
                id,
                duration_ms,
                at,
            } => {
                if let Some(job) = self.jobs.get_mut(&id) {
                    job.status = StateKind::Completed;
                    job.duration_ms = Some(duration_ms);
                }
                self.completions.push_back((at, duration_ms));
                self.mark_terminal(id, max_entries);
            }
            JobEvent::Retrying { id, error, .. } => {
                if let Some(job) = self.jobs.get_mut(&id) {
                    job.status = StateKind::Delayed;
                    job.last_error = Some(error);
                }
            }
            JobEvent::Failed { id, error, at } => {
                if let Some(job) = self.jobs.get_mut(&id) {
                    job.status = StateKind::Failed;
                    job.last_error = Some(error);
                }
                self.failures.push_back(at);
                self.mark_terminal(id, max_entries);
            }
            JobEvent::Stalled {
                id, stalled_count, ..
            } => {
                if let Some(job) = self.jobs.get_mut(&id) {
                    job.status = StateKind::Waiting;
                    job.stalled_count = stalled_count;
                }
            }
            JobEvent::Removed { id, .. } => {
                self.jobs.remove(&id);
            }
        }
    }

    fn mark_terminal(&mut self, id: JobId, max_entries: usize) {
        self.terminal_order.push_back(id);
        while self.terminal_order.len() > max_entries {
            if let Some(evicted) = self.terminal_order.pop_front() {
                self.jobs.remove(&evicted);
            }
        }
    }

    fn prune_windows(&mut self, now: DateTime<Utc>) {
        let cutoff = now - RATE_WINDOW;
        while self
            .completions
            .front()
            .is_some_and(|(at, _)| *at < cutoff)
        {
            self.completions.pop_front();
        }
        while self.failures.front().is_some_and(|at| *at < cutoff) {
            self.failures.pop_front();
        }
    }

    fn sample(&mut self, counts: StateCounts, history_size: usize) -> MetricsSample {
        let now = Utc::now();
        self.prune_windows(now);

        let completions = self.completions.len();
        let failures = self.failures.len();
        let total = completions + failures;
        let avg_processing_ms = if completions > 0 {
            self.completions.iter().map(|(_, d)| *d as f64).sum::<f64>() / completions as f64
        } else {
            0.0
        };
        let error_rate = if total > 0 {
            failures as f64 / total as f64
        } else {
            0.0
        };

        let sample = MetricsSample {
            timestamp: now,
            counts,
            avg_processing_ms,
            error_rate,
            throughput_per_min: completions,
        };
        self.history.push_back(sample.clone());
        while self.history.len() > history_size {
            self.history.pop_front();
        }
        sample
    }
}

/// Passive observer of a queue. Folds the queue's event stream into per-job
/// traces and periodically samples aggregate counts into a bounded history
/// ring. Read-only: never mutates queue state.
pub struct Monitor<K: JobKind> {
    queue: Queue<K>,
    config: MonitorConfig,
    inner: Arc<Mutex<Inner>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<K: JobKind> Monitor<K> {
    pub fn new(queue: Queue<K>, config: MonitorConfig) -> Self {
        Self {
            queue,
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the event-fold and sampling tasks.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let inner = self.inner.clone();
        let max_entries = self.config.max_job_entries;
        let mut events = self.queue.events();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                inner.lock().apply(event, max_entries);
            }
            debug!("monitor event stream closed");
        }));

        let inner = self.inner.clone();
        let queue = self.queue.clone();
        let sample_interval = self.config.sample_interval;
        let history_size = self.config.history_size;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sample_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match queue.counts().await {
                    Ok(counts) => {
                        inner.lock().sample(counts, history_size);
                    }
                    Err(err) => warn!(%err, "metrics sample skipped"),
                }
            }
        }));
    }

    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Current aggregate view, computed on demand rather than waiting for
    /// the next scheduled sample.
    pub async fn sample_now(&self) -> Option<MetricsSample> {
        match self.queue.counts().await {
            Ok(counts) => Some(self.inner.lock().sample(counts, self.config.history_size)),
            Err(err) => {
                warn!(%err, "on-demand metrics sample failed");
                None
            }
        }
    }

    /// Historical samples, oldest first.
    pub fn history(&self) -> Vec<MetricsSample> {
        self.inner.lock().history.iter().cloned().collect()
    }

    pub fn job_metrics(&self, id: &JobId) -> Option<JobMetrics> {
        self.inner.lock().jobs.get(id).cloned()
    }

    pub fn all_job_metrics(&self) -> Vec<JobMetrics> {
        self.inner.lock().jobs.values().cloned().collect()
    }
}

impl<K: JobKind> Drop for Monitor<K> {
    fn drop(&mut self) {
        self.stop();
    }
}
