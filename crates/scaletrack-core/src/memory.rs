use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use scaletrack_shared::{
    ChangeEvent, ChangeKind, OwnerId, Task, TaskCreate, TaskId, TaskStatus,
};
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use crate::backend::{ChangeFeed, ChangeHub, TaskBackend, TaskQuery};
use crate::error::BackendError;

/// In-process `tasks` table with a realtime feed. `set_offline(true)` makes
/// every call fail with [`BackendError::Unavailable`] until switched back.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: Mutex<Vec<Task>>,
    changes: ChangeHub,
    offline: AtomicBool,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        debug!(offline, "memory backend availability changed");
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every stored row, any owner.
    #[must_use]
    pub fn rows(&self) -> Vec<Task> {
        self.rows.lock().clone()
    }

    pub fn changes(&self) -> &ChangeHub {
        &self.changes
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable);
        }
        Ok(())
    }

    fn emit(&self, kind: ChangeKind) {
        let delivered = self.changes.publish(ChangeEvent::tasks(kind, Utc::now()));
        debug!(?kind, delivered, "published task change");
    }
}

#[async_trait]
impl TaskBackend for MemoryBackend {
    #[instrument(skip(self))]
    async fn select(&self, owner: OwnerId, query: TaskQuery) -> Result<Vec<Task>, BackendError> {
        self.ensure_online()?;
        let rows = self.rows.lock();
        Ok(query.apply(owner, rows.iter()))
    }

    #[instrument(skip(self, input), fields(title_len = input.title.len()))]
    async fn insert(&self, owner: OwnerId, input: TaskCreate) -> Result<Task, BackendError> {
        self.ensure_online()?;
        input.validate().map_err(BackendError::Rejected)?;
        let task = input.into_task(owner, Utc::now());
        self.rows.lock().push(task.clone());
        self.emit(ChangeKind::Insert);
        Ok(task)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        owner: OwnerId,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<Task, BackendError> {
        self.ensure_online()?;
        let updated = {
            let mut rows = self.rows.lock();
            let row = rows
                .iter_mut()
                .find(|task| task.id == id && task.owner == owner)
                .ok_or(BackendError::NotFound(id))?;
            row.status = status;
            row.updated_at = Utc::now().max(row.updated_at);
            row.clone()
        };
        self.emit(ChangeKind::Update);
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete(&self, owner: OwnerId, id: TaskId) -> Result<(), BackendError> {
        self.ensure_online()?;
        {
            let mut rows = self.rows.lock();
            let idx = rows
                .iter()
                .position(|task| task.id == id && task.owner == owner)
                .ok_or(BackendError::NotFound(id))?;
            rows.remove(idx);
        }
        self.emit(ChangeKind::Delete);
        Ok(())
    }
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe(table)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use scaletrack_shared::TASKS_TABLE;
    use uuid::Uuid;

    use super::*;

    fn input(title: &str, day: u32) -> TaskCreate {
        TaskCreate::new(title, NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date"))
    }

    #[tokio::test]
    async fn rows_are_scoped_to_their_owner() {
        let backend = MemoryBackend::new();
        let alice = OwnerId(Uuid::new_v4());
        let bob = OwnerId(Uuid::new_v4());

        let task = backend.insert(alice, input("Feed gecko", 1)).await.expect("insert");
        backend.insert(bob, input("Clean tank", 2)).await.expect("insert");

        let seen = backend.select(alice, TaskQuery::all()).await.expect("select");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, task.id);

        let err = backend
            .delete(bob, task.id)
            .await
            .expect_err("bob cannot delete alice's task");
        assert!(matches!(err, BackendError::NotFound(id) if id == task.id));
    }

    #[tokio::test]
    async fn select_filters_status_and_limits() {
        let backend = MemoryBackend::new();
        let owner = OwnerId(Uuid::new_v4());
        for day in [5, 3, 4, 1] {
            backend.insert(owner, input(&format!("day {day}"), day)).await.expect("insert");
        }
        let first = backend.select(owner, TaskQuery::all()).await.expect("select")[0].clone();
        backend
            .update_status(owner, first.id, TaskStatus::Completed)
            .await
            .expect("complete");

        let upcoming = backend.select(owner, TaskQuery::upcoming(2)).await.expect("select");
        let titles: Vec<&str> = upcoming.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["day 3", "day 4"]);

        let done = backend
            .select(owner, TaskQuery::with_status(TaskStatus::Completed))
            .await
            .expect("select");
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].title, "day 1");
    }

    #[tokio::test]
    async fn writes_publish_change_events() {
        let backend = MemoryBackend::new();
        let owner = OwnerId(Uuid::new_v4());
        let mut rx = backend.subscribe(TASKS_TABLE);

        let task = backend.insert(owner, input("Mist", 1)).await.expect("insert");
        backend.delete(owner, task.id).await.expect("delete");

        assert_eq!(rx.recv().await.expect("insert event").kind, ChangeKind::Insert);
        assert_eq!(rx.recv().await.expect("delete event").kind, ChangeKind::Delete);
    }

    #[tokio::test]
    async fn offline_backend_rejects_calls() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        let owner = OwnerId(Uuid::new_v4());
        let err = backend.select(owner, TaskQuery::all()).await.expect_err("offline");
        assert!(matches!(err, BackendError::Unavailable));
        backend.set_offline(false);
        assert!(backend.select(owner, TaskQuery::all()).await.is_ok());
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let backend = MemoryBackend::new();
        let err = backend
            .insert(OwnerId(Uuid::new_v4()), input("  ", 1))
            .await
            .expect_err("blank title");
        assert!(matches!(err, BackendError::Rejected(_)));
        assert!(backend.rows().is_empty());
    }
}
