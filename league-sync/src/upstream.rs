use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UpstreamError;

/// Raw bootstrap document as the upstream serves it. Sections stay
/// untyped here; the pipeline's transform step parses and validates them
/// into domain entities so a schema drift in one section cannot poison
/// the others.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBootstrap {
    #[serde(default)]
    pub events: Vec<Value>,

    #[serde(default)]
    pub teams: Vec<Value>,

    /// Upstream's name for players
    #[serde(default)]
    pub elements: Vec<Value>,

    #[serde(default)]
    pub phases: Vec<Value>,
}

/// Read-only upstream data source. Implementations map transport failures
/// onto [`UpstreamError`]; the pipeline never sees a raw HTTP error.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// The full reference document: events, teams, players, phases
    async fn fetch_bootstrap(&self) -> Result<RawBootstrap, UpstreamError>;

    /// Live scoring lines for one gameweek
    async fn fetch_fixtures(&self, event_id: u32) -> Result<Vec<Value>, UpstreamError>;
}
