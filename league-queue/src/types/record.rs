use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobSpec, LockToken};

/// Job lifecycle - a job is in exactly one of these states at any instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    /// Eligible and waiting to be claimed
    Waiting,

    /// Not yet eligible: initial delay, or backoff after a retryable failure
    Delayed { until: DateTime<Utc> },

    /// Claimed by a worker holding a renewable lock
    Active { lock_until: DateTime<Utc> },

    /// Finished successfully
    Completed { at: DateTime<Utc> },

    /// Terminal failure: retry budget exhausted, stalled too often, or a
    /// non-retryable error
    Failed { at: DateTime<Utc>, error: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn kind(&self) -> StateKind {
        match self {
            Self::Waiting => StateKind::Waiting,
            Self::Delayed { .. } => StateKind::Delayed,
            Self::Active { .. } => StateKind::Active,
            Self::Completed { .. } => StateKind::Completed,
            Self::Failed { .. } => StateKind::Failed,
        }
    }
}

/// Plain state tag for queries and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl StateKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Per-state job counts at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StateCounts {
    pub fn total(&self) -> u64 {
        self.waiting + self.delayed + self.active + self.completed + self.failed
    }
}

/// Mutable runtime state of a job, stored durably
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord<K> {
    pub id: JobId,
    pub spec: JobSpec<K>,
    pub state: JobState,

    /// Processing attempts consumed so far; never exceeds `spec.max_attempts`
    pub attempts_made: u32,

    /// Times the lock expired without an acknowledgment - counted
    /// separately from attempt-based retries
    pub stalled_count: u32,

    /// Handler-reported progress, 0-100
    pub progress: u8,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Earliest eligible execution time
    pub scheduled_at: DateTime<Utc>,

    /// When the current attempt started, if any
    pub started_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
    pub lock_token: Option<LockToken>,
}

impl<K> JobRecord<K> {
    pub fn new(id: JobId, spec: JobSpec<K>) -> Self {
        let now = Utc::now();
        let (state, scheduled_at) = match spec.delay {
            Some(delay) => {
                let until = now + chrono::Duration::from_std(delay).unwrap_or_default();
                (JobState::Delayed { until }, until)
            }
            None => (JobState::Waiting, now),
        };

        Self {
            id,
            spec,
            state,
            attempts_made: 0,
            stalled_count: 0,
            progress: 0,
            created_at: now,
            updated_at: now,
            scheduled_at,
            started_at: None,
            last_error: None,
            lock_token: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the lock has expired for an active job
    pub fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(&self.state, JobState::Active { lock_until } if *lock_until < now)
    }

    /// Begin a processing attempt under a fresh lock
    pub fn start_active(&mut self, token: LockToken, lock_until: DateTime<Utc>) {
        self.state = JobState::Active { lock_until };
        self.lock_token = Some(token);
        self.attempts_made += 1;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self) {
        self.state = JobState::Completed { at: Utc::now() };
        self.lock_token = None;
        self.progress = 100;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: String) {
        self.state = JobState::Failed {
            at: Utc::now(),
            error: error.clone(),
        };
        self.last_error = Some(error);
        self.lock_token = None;
        self.updated_at = Utc::now();
    }

    /// Schedule the next attempt after a retryable failure
    pub fn delay_retry(&mut self, until: DateTime<Utc>, error: String) {
        self.state = JobState::Delayed { until };
        self.scheduled_at = until;
        self.last_error = Some(error);
        self.lock_token = None;
        self.updated_at = Utc::now();
    }

    /// Return the job to waiting without consuming the attempt - used when
    /// an abandoned or stalled job is reclaimed
    pub fn requeue(&mut self) {
        self.state = JobState::Waiting;
        self.attempts_made = self.attempts_made.saturating_sub(1);
        self.lock_token = None;
        self.started_at = None;
        self.updated_at = Utc::now();
    }

    /// Reset a failed job back to waiting with a fresh retry budget
    pub fn reset_for_retry(&mut self) {
        self.state = JobState::Waiting;
        self.attempts_made = 0;
        self.stalled_count = 0;
        self.progress = 0;
        self.scheduled_at = Utc::now();
        self.lock_token = None;
        self.started_at = None;
        self.updated_at = Utc::now();
    }

    /// Timestamp at which the job reached a terminal state, if it has
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            JobState::Completed { at } => Some(*at),
            JobState::Failed { at, .. } => Some(*at),
            _ => None,
        }
    }
}

/// A job claimed by a worker, with the lock it must acknowledge under
#[derive(Debug, Clone)]
pub struct ClaimedJob<K> {
    pub record: JobRecord<K>,
    pub lock_token: LockToken,
    pub lock_until: DateTime<Utc>,
}

impl<K> ClaimedJob<K> {
    pub fn id(&self) -> &JobId {
        &self.record.id
    }

    pub fn lock_valid(&self, now: DateTime<Utc>) -> bool {
        self.lock_until > now
    }
}
