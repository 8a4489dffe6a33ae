use std::fmt;

use league_queue::{JobError, JobRecord};
use serde::{Deserialize, Serialize};

/// Closed set of sync job types. Dispatch is exhaustive over this enum, so
/// an unroutable job can only come from registration drift, not typos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full reference sync: events, teams, players, phases in one pass
    Bootstrap,
    Events,
    Teams,
    Players,
    Phases,
    /// Per-gameweek scoring lines; requires a target event
    LiveStats,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        Self::Bootstrap,
        Self::Events,
        Self::Teams,
        Self::Players,
        Self::Phases,
        Self::LiveStats,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Events => "events",
            Self::Teams => "teams",
            Self::Players => "players",
            Self::Phases => "phases",
            Self::LiveStats => "live_stats",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    Sync,
    Update,
    Delete,
}

/// Structured job payload carried in [`league_queue::JobSpec::payload`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPayload {
    #[serde(default)]
    pub op: Operation,

    /// Target event id, required by [`JobType::LiveStats`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,

    /// Entity ids for `Delete` operations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<u32>,

    /// Sync even when upstream data looks unchanged
    #[serde(default)]
    pub force: bool,
}

impl SyncPayload {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Decode the payload off a claimed job. An undecodable payload is a
    /// terminal validation error: retrying cannot fix it.
    pub fn from_job(job: &JobRecord<JobType>) -> Result<Self, JobError> {
        if job.spec.payload.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(job.spec.payload.clone())
            .map_err(|err| JobError::validation(format!("invalid job payload: {err}")))
    }
}
