pub mod events;
pub mod ids;
pub mod record;
pub mod spec;

pub use events::JobEvent;
pub use ids::{JobId, LockToken};
pub use record::{ClaimedJob, JobRecord, JobState, StateCounts, StateKind};
pub use spec::{
    BackoffPolicy, JobKind, JobSpec, QueueConfig, RateLimit, RetentionPolicy, DEFAULT_MAX_ATTEMPTS,
};
