use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::model::Entity;

/// Source-of-truth persistence for one entity collection. All failures are
/// typed: the caller needs to know whether retrying can help.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError>;

    async fn find_all(&self) -> Result<Vec<T>, StoreError>;

    /// Insert-or-update keyed by natural id; never duplicates. Returns the
    /// number of rows written.
    async fn upsert_batch(&self, entities: Vec<T>) -> Result<usize, StoreError>;

    /// Returns the number of rows actually deleted.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError>;
}

/// In-process store keyed by natural id. Canonical dev/test backend;
/// `find_all` returns rows in id order for deterministic assertions.
#[derive(Default)]
pub struct MemoryEntityStore<T> {
    rows: RwLock<BTreeMap<String, T>>,
}

impl<T> MemoryEntityStore<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MemoryEntityStore<T> {
    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.rows.read().values().cloned().collect())
    }

    async fn upsert_batch(&self, entities: Vec<T>) -> Result<usize, StoreError> {
        let mut rows = self.rows.write();
        let count = entities.len();
        for entity in entities {
            rows.insert(entity.entity_id(), entity);
        }
        Ok(count)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        for id in ids {
            rows.remove(id);
        }
        Ok(before - rows.len())
    }
}
