use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{JobError, JobKind, JobRecord, QueueError, QueueResult};

/// Handler for one job kind. Handlers are pure functions of the job and a
/// shared context; they never touch queue bookkeeping.
#[async_trait]
pub trait JobHandler<K: JobKind, C: Send + Sync>: Send + Sync {
    async fn run(&self, job: &JobRecord<K>, ctx: &C) -> Result<(), JobError>;
}

/// Maps a job's declared kind to its handler. The kind type is a closed
/// enum, so an unhandled kind is a registration gap surfaced as a typed,
/// non-retryable error rather than a panic.
pub struct Dispatcher<K: JobKind, C: Send + Sync> {
    handlers: HashMap<K, Arc<dyn JobHandler<K, C>>>,
}

impl<K: JobKind, C: Send + Sync> Dispatcher<K, C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a kind. Registered once at startup;
    /// re-registering the same kind is an error.
    pub fn register(&mut self, kind: K, handler: Arc<dyn JobHandler<K, C>>) -> QueueResult<()> {
        if self.handlers.contains_key(&kind) {
            return Err(QueueError::HandlerAlreadyRegistered(kind.to_string()));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn is_registered(&self, kind: &K) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn registered_kinds(&self) -> Vec<K> {
        self.handlers.keys().cloned().collect()
    }

    /// Resolve and run the handler for `job`
    pub async fn dispatch(&self, job: &JobRecord<K>, ctx: &C) -> Result<(), JobError> {
        let handler = self
            .handlers
            .get(&job.spec.kind)
            .ok_or_else(|| JobError::UnknownKind(job.spec.kind.to_string()))?;
        handler.run(job, ctx).await
    }
}

impl<K: JobKind, C: Send + Sync> Default for Dispatcher<K, C> {
    fn default() -> Self {
        Self::new()
    }
}
