use std::sync::Arc;

use league_cache::{CacheAside, KvStore, MemoryKv};

use crate::config::CacheTtls;
use crate::model::{Event, LiveStat, Phase, Player, Team};
use crate::store::{EntityStore, MemoryEntityStore};
use crate::upstream::UpstreamClient;

/// Every external collaborator the service talks to, constructed once at
/// process start and passed down explicitly - no module-level singletons.
pub struct Dependencies {
    pub upstream: Arc<dyn UpstreamClient>,
    pub events: Arc<dyn EntityStore<Event>>,
    pub teams: Arc<dyn EntityStore<Team>>,
    pub players: Arc<dyn EntityStore<Player>>,
    pub phases: Arc<dyn EntityStore<Phase>>,
    pub live_stats: Arc<dyn EntityStore<LiveStat>>,
    pub kv: Arc<dyn KvStore>,
}

impl Dependencies {
    /// All-in-process wiring around a given upstream. The standard setup
    /// for local development and tests.
    pub fn in_memory(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            upstream,
            events: Arc::new(MemoryEntityStore::new()),
            teams: Arc::new(MemoryEntityStore::new()),
            players: Arc::new(MemoryEntityStore::new()),
            phases: Arc::new(MemoryEntityStore::new()),
            live_stats: Arc::new(MemoryEntityStore::new()),
            kv: Arc::new(MemoryKv::new()),
        }
    }
}

/// One cache-aside instance per entity collection, sharing one key-value
/// backend. Reference collections get the long TTL, live stats the short
/// one.
pub struct Caches {
    pub events: CacheAside<Event>,
    pub teams: CacheAside<Team>,
    pub players: CacheAside<Player>,
    pub phases: CacheAside<Phase>,
    pub live_stats: CacheAside<LiveStat>,
}

impl Caches {
    pub fn new(kv: Arc<dyn KvStore>, ttls: &CacheTtls) -> Self {
        Self {
            events: CacheAside::new(kv.clone(), "events").with_ttl(ttls.reference),
            teams: CacheAside::new(kv.clone(), "teams").with_ttl(ttls.reference),
            players: CacheAside::new(kv.clone(), "players").with_ttl(ttls.reference),
            phases: CacheAside::new(kv.clone(), "phases").with_ttl(ttls.reference),
            live_stats: CacheAside::new(kv, "live_stats").with_ttl(ttls.live),
        }
    }
}

/// Shared handler context: dependencies plus caches, cheap to clone.
#[derive(Clone)]
pub struct SyncContext {
    pub deps: Arc<Dependencies>,
    pub caches: Arc<Caches>,
}
