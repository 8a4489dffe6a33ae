use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::CacheResult;

/// String key-value storage primitives - must be implemented by all cache
/// backends. Values are opaque strings; the layer above decides the encoding.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value, `None` on missing or expired keys
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key; deleting a missing key is not an error
    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Delete several keys in one call
    async fn del_many(&self, keys: &[String]) -> CacheResult<()>;

    /// Liveness check against the backend
    async fn ping(&self) -> CacheResult<()>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store with lazy expiry: expired entries are dropped when read,
/// not by a background sweeper.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        // Expired: upgrade to a write lock and drop it
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn del_many(&self, keys: &[String]) -> CacheResult<()> {
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
