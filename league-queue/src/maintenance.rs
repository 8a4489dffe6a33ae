use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::store::JobStore;
use crate::{JobKind, RetentionPolicy};

/// Background housekeeping for one queue: stalled-job recovery, delayed-job
/// promotion, and terminal-job retention. Errors in any pass are logged and
/// skipped; maintenance must never take the queue down.
pub struct Maintenance<K: JobKind> {
    store: Arc<dyn JobStore<K>>,
    retention_completed: RetentionPolicy,
    retention_failed: RetentionPolicy,
    interval: Duration,
}

/// Handle for shutting the maintenance task down
pub struct MaintenanceHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join_handle.await;
    }
}

impl<K: JobKind> Maintenance<K> {
    pub fn new(
        store: Arc<dyn JobStore<K>>,
        retention_completed: RetentionPolicy,
        retention_failed: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            retention_completed,
            retention_failed,
            interval: Duration::from_secs(15),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one maintenance cycle. Exposed for deterministic tests.
    pub async fn tick(&self) {
        match self.store.reap_expired_locks().await {
            Ok(0) => debug!("no expired locks"),
            Ok(reclaimed) => info!(reclaimed, "reclaimed stalled jobs"),
            Err(err) => warn!(%err, "stalled-job sweep failed, skipping"),
        }

        match self.store.promote_due().await {
            Ok(0) => {}
            Ok(promoted) => debug!(promoted, "promoted delayed jobs"),
            Err(err) => warn!(%err, "delayed-job promotion failed, skipping"),
        }

        match self
            .store
            .purge_terminal(&self.retention_completed, &self.retention_failed)
            .await
        {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "purged terminal jobs past retention"),
            Err(err) => warn!(%err, "retention purge failed, skipping"),
        }
    }

    /// Spawn the periodic maintenance loop
    pub fn spawn(self) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            info!(interval = ?self.interval, "maintenance started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("maintenance shutdown requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
        });

        MaintenanceHandle {
            shutdown_tx,
            join_handle,
        }
    }
}
