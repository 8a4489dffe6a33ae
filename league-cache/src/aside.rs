use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CacheResult;
use crate::kv::KvStore;

/// Read-through / invalidate-on-write cache for one entity collection.
///
/// Reads never fail because of the cache: a store error or an undecodable
/// payload degrades to a miss and the loader is consulted. Population after
/// a miss is fire-and-forget so a slow or broken cache backend cannot delay
/// the response. Writes that invalidate are awaited - serving stale data is
/// worse than a slow write.
///
/// Keys are `{prefix}:{id}` per entity and `{prefix}:all` for the full
/// collection.
pub struct CacheAside<T> {
    store: Arc<dyn KvStore>,
    prefix: String,
    ttl: Option<Duration>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheAside<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            prefix: self.prefix.clone(),
            ttl: self.ttl,
            _entity: PhantomData,
        }
    }
}

impl<T> CacheAside<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl: None,
            _entity: PhantomData,
        }
    }

    /// Expire cached entries after `ttl`. Without this, entries live until
    /// invalidated.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn entity_key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix, id)
    }

    fn collection_key(&self) -> String {
        format!("{}:all", self.prefix)
    }

    /// Fetch one entity, consulting the loader on a miss. The loader's
    /// error passes through untouched; cache trouble only logs.
    pub async fn get_one<F, Fut, E>(&self, id: &str, loader: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let key = self.entity_key(id);
        if let Some(value) = self.read_cached(&key).await {
            return Ok(Some(value));
        }

        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.populate(key, value);
        }
        Ok(loaded)
    }

    /// Fetch the whole collection, consulting the loader on a miss.
    pub async fn get_all<F, Fut, E>(&self, loader: F) -> Result<Vec<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let key = self.collection_key();
        if let Some(values) = self.read_cached(&key).await {
            return Ok(values);
        }

        let loaded = loader().await?;
        self.populate(key, &loaded);
        Ok(loaded)
    }

    /// Write one entity into the cache and drop the now-stale collection
    /// entry. Awaited: callers rely on the cache being coherent afterwards.
    pub async fn put(&self, id: &str, value: &T) -> CacheResult<()> {
        let payload = serde_json::to_string(value)?;
        self.store.set(&self.entity_key(id), payload, self.ttl).await?;
        self.store.del(&self.collection_key()).await
    }

    /// Batch variant of [`put`](Self::put); the collection entry is dropped
    /// once at the end.
    pub async fn put_all(&self, entries: &[(String, T)]) -> CacheResult<()> {
        for (id, value) in entries {
            let payload = serde_json::to_string(value)?;
            self.store.set(&self.entity_key(id), payload, self.ttl).await?;
        }
        self.store.del(&self.collection_key()).await
    }

    /// Drop one entity's entry and the collection entry.
    pub async fn invalidate(&self, id: &str) -> CacheResult<()> {
        self.store
            .del_many(&[self.entity_key(id), self.collection_key()])
            .await
    }

    /// Drop the collection entry. Per-entity entries age out via TTL.
    pub async fn invalidate_all(&self) -> CacheResult<()> {
        self.store.del(&self.collection_key()).await
    }

    async fn read_cached<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key, %err, "cache read failed, falling back to loader");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(key, %err, "undecodable cache entry, dropping it");
                let store = self.store.clone();
                let key = key.to_string();
                tokio::spawn(async move {
                    if let Err(err) = store.del(&key).await {
                        warn!(key, %err, "failed to drop undecodable cache entry");
                    }
                });
                None
            }
        }
    }

    fn populate<V: Serialize>(&self, key: String, value: &V) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, %err, "cache population skipped, value not serializable");
                return;
            }
        };
        let store = self.store.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            if let Err(err) = store.set(&key, payload, ttl).await {
                warn!(key, %err, "cache population failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use serde::Deserialize;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Team {
        id: u32,
        name: String,
    }

    fn team(id: u32) -> Team {
        Team {
            id,
            name: format!("team-{id}"),
        }
    }

    fn cache(store: &Arc<MemoryKv>) -> CacheAside<Team> {
        CacheAside::new(store.clone() as Arc<dyn KvStore>, "teams")
    }

    #[tokio::test]
    async fn miss_consults_loader_then_populates() {
        let store = Arc::new(MemoryKv::new());
        let cache = cache(&store);
        let calls = AtomicU32::new(0);

        let got = cache
            .get_one("7", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Some(team(7)))
            })
            .await
            .unwrap();
        assert_eq!(got, Some(team(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Population is fire-and-forget; give the spawned task a beat
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get("teams:7").await.unwrap().is_some());

        // Second read is served from cache
        let got = cache
            .get_one("7", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(None)
            })
            .await
            .unwrap();
        assert_eq!(got, Some(team(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loader_none_is_not_cached() {
        let store = Arc::new(MemoryKv::new());
        let cache = cache(&store);

        let got = cache
            .get_one("404", || async { Ok::<_, Infallible>(None) })
            .await
            .unwrap();
        assert_eq!(got, None);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get("teams:404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn loader_error_passes_through() {
        let store = Arc::new(MemoryKv::new());
        let cache = cache(&store);

        let got: Result<Option<Team>, &str> =
            cache.get_one("7", || async { Err("db down") }).await;
        assert_eq!(got, Err("db down"));
    }

    #[tokio::test]
    async fn undecodable_entry_degrades_to_miss() {
        let store = Arc::new(MemoryKv::new());
        store
            .set("teams:7", "not json{".to_string(), None)
            .await
            .unwrap();
        let cache = cache(&store);

        let got = cache
            .get_one("7", || async { Ok::<_, Infallible>(Some(team(7))) })
            .await
            .unwrap();
        assert_eq!(got, Some(team(7)));
    }

    #[tokio::test]
    async fn invalidate_drops_entity_and_collection() {
        let store = Arc::new(MemoryKv::new());
        let cache = cache(&store);

        cache.put("7", &team(7)).await.unwrap();
        cache
            .get_all(|| async { Ok::<_, Infallible>(vec![team(7)]) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get("teams:all").await.unwrap().is_some());

        cache.invalidate("7").await.unwrap();
        assert!(store.get("teams:7").await.unwrap().is_none());
        assert!(store.get("teams:all").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_all_writes_entries_and_drops_collection() {
        let store = Arc::new(MemoryKv::new());
        let cache = cache(&store);
        store
            .set("teams:all", "[]".to_string(), None)
            .await
            .unwrap();

        cache
            .put_all(&[("1".to_string(), team(1)), ("2".to_string(), team(2))])
            .await
            .unwrap();
        assert!(store.get("teams:1").await.unwrap().is_some());
        assert!(store.get("teams:2").await.unwrap().is_some());
        assert!(store.get("teams:all").await.unwrap().is_none());
    }
}
