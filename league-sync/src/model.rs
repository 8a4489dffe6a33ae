use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A domain entity with a natural id, used as the store and cache key.
/// Upserts key on this id: syncing the same upstream row twice updates in
/// place, never duplicates.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn entity_id(&self) -> String;
}

/// A gameweek round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub deadline_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub is_current: bool,
}

impl Entity for Event {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub short_name: String,
    #[serde(default)]
    pub strength: u32,
}

impl Entity for Team {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: u32,
    pub team: u32,
    pub web_name: String,
    pub element_type: u8,
    #[serde(default)]
    pub total_points: i32,
}

impl Entity for Player {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

/// A named span of gameweeks (e.g. "Overall", "October")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: u32,
    pub name: String,
    pub start_event: u32,
    pub stop_event: u32,
}

impl Entity for Phase {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

/// Per-player per-gameweek live scoring line. Composite natural id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStat {
    pub event: u32,
    pub player: u32,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub total_points: i32,
}

impl Entity for LiveStat {
    fn entity_id(&self) -> String {
        format!("{}:{}", self.event, self.player)
    }
}
