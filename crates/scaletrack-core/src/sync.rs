//! Realtime sync: any change on the `tasks` table reloads the store.
//!
//! Events are never applied incrementally. Each one triggers a full
//! `load()`, and events missed while disconnected are only recovered by
//! the next reload.

use std::sync::Arc;

use scaletrack_shared::TASKS_TABLE;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::ChangeFeed;
use crate::store::TaskStore;

/// Live subscription driving reloads of one store. Dropping it ends the
/// subscription.
#[derive(Debug)]
pub struct SyncBridge {
    handle: JoinHandle<()>,
    reloads: watch::Receiver<u64>,
}

impl SyncBridge {
    /// Subscribes to `feed` and starts reloading `store` on every event.
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<TaskStore>, feed: &dyn ChangeFeed) -> Self {
        let mut events = feed.subscribe(TASKS_TABLE);
        let (reload_tx, reload_rx) = watch::channel(0u64);

        let handle = tokio::spawn(async move {
            info!("realtime task sync started");
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(kind = ?event.kind, at = %event.at, "task table changed");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change feed lagged; reloading once");
                    }
                    Err(RecvError::Closed) => {
                        info!("change feed closed; realtime task sync stopped");
                        break;
                    }
                }

                if let Err(err) = store.load().await {
                    warn!(error = %err, "realtime reload failed");
                }
                reload_tx.send_modify(|count| *count += 1);
            }
        });

        Self {
            handle,
            reloads: reload_rx,
        }
    }

    /// Counter of reloads performed so far; `changed()` fires after each.
    #[must_use]
    pub fn reloads(&self) -> watch::Receiver<u64> {
        self.reloads.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Ends the subscription now instead of at drop.
    pub fn shutdown(self) {
        debug!("realtime task sync shutting down");
        self.handle.abort();
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
