use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Typed lifecycle events broadcast for observers. Consumed by the monitor;
/// never on the critical path of job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent<K> {
    /// Job entered the waiting (or delayed) set
    Enqueued {
        id: JobId,
        kind: K,
        at: DateTime<Utc>,
    },

    /// Job was claimed by a worker
    Active { id: JobId, at: DateTime<Utc> },

    /// Handler reported progress
    Progress {
        id: JobId,
        percent: u8,
        at: DateTime<Utc>,
    },

    /// Job finished successfully
    Completed {
        id: JobId,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    /// Retryable failure - next attempt scheduled
    Retrying {
        id: JobId,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Terminal failure
    Failed {
        id: JobId,
        error: String,
        at: DateTime<Utc>,
    },

    /// Lock expired without acknowledgment; job presumed abandoned
    Stalled {
        id: JobId,
        stalled_count: u32,
        at: DateTime<Utc>,
    },

    /// Job was explicitly removed
    Removed { id: JobId, at: DateTime<Utc> },
}

impl<K> JobEvent<K> {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Active { .. } => "active",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Retrying { .. } => "retrying",
            Self::Failed { .. } => "failed",
            Self::Stalled { .. } => "stalled",
            Self::Removed { .. } => "removed",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { id, .. }
            | Self::Active { id, .. }
            | Self::Progress { id, .. }
            | Self::Completed { id, .. }
            | Self::Retrying { id, .. }
            | Self::Failed { id, .. }
            | Self::Stalled { id, .. }
            | Self::Removed { id, .. } => id,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Active { at, .. }
            | Self::Progress { at, .. }
            | Self::Completed { at, .. }
            | Self::Retrying { at, .. }
            | Self::Failed { at, .. }
            | Self::Stalled { at, .. }
            | Self::Removed { at, .. } => at,
        }
    }
}
