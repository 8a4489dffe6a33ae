//! # league-queue: Durable Background Job Processing
//!
//! **In-process job queue with at-least-once delivery and lease-based claims**
//!
//! league-queue powers background synchronization workloads that must survive
//! handler crashes, flaky upstreams, and workers that silently die:
//!
//! - **Lease-token claims**: every active job carries an expiring lock; only
//!   the token holder may acknowledge, renew, or fail it
//! - **Stall recovery**: expired locks are reaped and jobs requeued, with a
//!   separate stall budget so crashes do not consume retry attempts
//! - **Typed dispatch**: job kinds are a closed generic type, so an
//!   unroutable job is a typed terminal error rather than a stringly bug
//! - **Priority + fairness**: lower priority value is served first; ties
//!   break by enqueue time
//! - **Idempotent producers**: an idempotency key held by an in-flight job
//!   rejects duplicates instead of silently merging them
//! - **Recurring schedules**: cron and fixed-interval templates enqueue
//!   fresh jobs, skipping ticks while the previous run is still in flight
//! - **Passive observability**: typed event streams plus a sampling monitor
//!   with a bounded history ring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use league_queue::{
//!     Dispatcher, JobError, JobHandler, JobRecord, JobSpec, Queue, QueueConfig,
//!     Worker, WorkerConfig,
//! };
//!
//! struct RefreshHandler;
//!
//! #[async_trait::async_trait]
//! impl JobHandler<String, ()> for RefreshHandler {
//!     async fn run(&self, job: &JobRecord<String>, _ctx: &()) -> Result<(), JobError> {
//!         // fetch, transform, persist...
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo() -> league_queue::QueueResult<()> {
//! let queue: Queue<String> = Queue::in_memory("sync", QueueConfig::default());
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.register("refresh".to_string(), Arc::new(RefreshHandler))?;
//!
//! let worker = Worker::new(vec![queue.clone()], dispatcher, (), WorkerConfig::default());
//! worker.start();
//!
//! queue.enqueue(JobSpec::new("refresh".to_string()).with_priority(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod maintenance;
pub mod monitor;
pub mod queue;
pub mod schedule;
pub mod store;
pub mod types;
pub mod worker;

pub use dispatch::{Dispatcher, JobHandler};
pub use error::{JobError, QueueError, QueueResult};
pub use maintenance::{Maintenance, MaintenanceHandle};
pub use monitor::{JobMetrics, MetricsSample, Monitor, MonitorConfig};
pub use queue::{Queue, QueueTasks};
pub use schedule::{Schedule, ScheduleRegistry, Scheduler, SchedulerHandle};
pub use store::memory::MemoryStore;
pub use store::{BoxStream, BulkEnqueueResult, JobStore};
pub use types::{
    BackoffPolicy, ClaimedJob, JobEvent, JobId, JobKind, JobRecord, JobSpec, JobState,
    LockToken, QueueConfig, RateLimit, RetentionPolicy, StateCounts, StateKind,
    DEFAULT_MAX_ATTEMPTS,
};
pub use worker::{Worker, WorkerConfig};
