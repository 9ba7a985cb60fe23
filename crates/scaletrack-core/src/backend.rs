//! Seams to the managed backend: the `tasks` table and its change feed.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use scaletrack_shared::{ChangeEvent, OwnerId, Task, TaskCreate, TaskId, TaskStatus};
use tokio::sync::broadcast;
use tracing::trace;

use crate::classify::upcoming_order;
use crate::error::BackendError;

/// Capacity of in-process change channels. A subscriber that falls further
/// behind than this sees `Lagged` and reloads once.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// The authenticated user a store acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub owner: OwnerId,
}

impl Session {
    #[must_use]
    pub fn new(owner: OwnerId) -> Self {
        Self { owner }
    }
}

/// Filter and bound for a `tasks` select. Results always come back in
/// due-date order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
}

impl TaskQuery {
    /// Pending tasks, soonest first, at most `limit`.
    #[must_use]
    pub fn upcoming(limit: usize) -> Self {
        Self {
            status: Some(TaskStatus::Pending),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            limit: None,
        }
    }

    /// Applies the filter, ordering and bound to an owner's rows.
    pub fn apply<'a, I>(&self, owner: OwnerId, rows: I) -> Vec<Task>
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut out: Vec<Task> = rows
            .into_iter()
            .filter(|task| task.owner == owner)
            .filter(|task| self.status.is_none_or(|status| task.status == status))
            .cloned()
            .collect();
        out.sort_by(|a, b| match upcoming_order(a, b) {
            Ordering::Equal => a.created_at.cmp(&b.created_at),
            other => other,
        });
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// Persistence for the `tasks` table. Every call is scoped to one owner;
/// rows belonging to anyone else behave as absent.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn select(&self, owner: OwnerId, query: TaskQuery) -> Result<Vec<Task>, BackendError>;

    async fn insert(&self, owner: OwnerId, input: TaskCreate) -> Result<Task, BackendError>;

    /// Sets `status` and bumps `updated_at`.
    async fn update_status(
        &self,
        owner: OwnerId,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<Task, BackendError>;

    async fn delete(&self, owner: OwnerId, id: TaskId) -> Result<(), BackendError>;
}

/// Source of realtime change notifications, independent of transport.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent>;
}

/// Per-table broadcast channels. Backends publish through it after each
/// successful write; tests use it to inject events directly.
#[derive(Debug, Default)]
pub struct ChangeHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
}

impl ChangeHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `event` to everyone subscribed to its table. Returns how many
    /// receivers got it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let channels = self.channels.lock();
        let Some(sender) = channels.get(&event.table) else {
            trace!(table = %event.table, "no subscribers for change event");
            return 0;
        };
        sender.send(event).unwrap_or(0)
    }
}

impl ChangeFeed for ChangeHub {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.channels
            .lock()
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
