use league_cache::CacheAside;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncStep};
use crate::model::Entity;
use crate::store::EntityStore;

/// Transform step: parse raw upstream rows into domain entities. One bad
/// row fails the whole batch - partially-applied reference data is worse
/// than stale reference data.
pub fn parse_entities<T: Entity>(raw: Vec<Value>, what: &str) -> Result<Vec<T>, SyncError> {
    raw.into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value(value)
                .map_err(|err| SyncError::Transform(format!("{what}[{index}]: {err}")))
        })
        .collect()
}

/// The core sequence: transform already-fetched rows, upsert them keyed by
/// natural id, then refresh the cache. A cache refresh failure only costs
/// the next reader a loader round-trip, so it logs instead of failing a
/// job whose source-of-truth write already succeeded.
pub async fn sync_entities<T: Entity>(
    raw: Vec<Value>,
    what: &str,
    store: &dyn EntityStore<T>,
    cache: &CacheAside<T>,
) -> Result<usize, SyncError> {
    let entities = parse_entities::<T>(raw, what)?;
    let count = store.upsert_batch(entities.clone()).await?;

    let entries: Vec<(String, T)> = entities
        .into_iter()
        .map(|entity| (entity.entity_id(), entity))
        .collect();
    if let Err(err) = cache.put_all(&entries).await {
        warn!(entity = what, step = %SyncStep::CacheRefresh, %err, "cache refresh failed after upsert");
    }

    debug!(entity = what, count, "entities synced");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Team;
    use crate::store::MemoryEntityStore;
    use league_cache::{KvStore, MemoryKv};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn sync_upserts_and_refreshes_cache() {
        let store = MemoryEntityStore::<Team>::new();
        let kv = Arc::new(MemoryKv::new());
        let cache = CacheAside::new(kv.clone() as Arc<dyn KvStore>, "teams");

        let raw = vec![
            json!({"id": 1, "name": "Arsenal", "short_name": "ARS", "strength": 4}),
            json!({"id": 2, "name": "Chelsea", "short_name": "CHE", "strength": 3}),
        ];
        let count = sync_entities(raw, "teams", &store, &cache).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.len(), 2);
        assert!(kv.get("teams:1").await.unwrap().is_some());
        assert!(kv.get("teams:2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn one_malformed_row_fails_the_batch_before_upsert() {
        let store = MemoryEntityStore::<Team>::new();
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let cache = CacheAside::new(kv, "teams");

        let raw = vec![
            json!({"id": 1, "name": "Arsenal", "short_name": "ARS"}),
            json!({"id": "not a number"}),
        ];
        let err = sync_entities(raw, "teams", &store, &cache).await.unwrap_err();

        assert_eq!(err.step(), SyncStep::Transform);
        assert!(!err.is_retryable());
        assert!(store.is_empty());
    }
}
