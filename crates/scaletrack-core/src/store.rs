//! Client-side view of the signed-in user's upcoming tasks.
//!
//! Every mutation is two-phase: the backend call goes first and the local
//! collection changes only after it succeeds, so a failed call leaves the
//! store exactly as it was.

use std::sync::Arc;

use parking_lot::Mutex;
use scaletrack_shared::{OwnerId, Task, TaskCreate, TaskId, TaskSnapshot, TaskStatus};
use tracing::{debug, info, instrument, warn};

use crate::backend::{Session, TaskBackend, TaskQuery};
use crate::classify::sort_upcoming;
use crate::error::TaskError;

pub const DEFAULT_UPCOMING_LIMIT: usize = 5;

#[derive(Debug, Default)]
struct StoreState {
    tasks: Vec<Task>,
    loads_in_flight: usize,
}

pub struct TaskStore {
    backend: Arc<dyn TaskBackend>,
    session: Option<Session>,
    limit: usize,
    state: Mutex<StoreState>,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("session", &self.session)
            .field("limit", &self.limit)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl TaskStore {
    pub fn new(backend: Arc<dyn TaskBackend>, session: Option<Session>) -> Self {
        Self {
            backend,
            session,
            limit: DEFAULT_UPCOMING_LIMIT,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Caps how many upcoming tasks the store keeps. Zero is treated as one.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock();
        TaskSnapshot {
            tasks: state.tasks.clone(),
            is_loading: state.loads_in_flight > 0,
        }
    }

    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().loads_in_flight > 0
    }

    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.state.lock().tasks.iter().any(|task| task.id == id)
    }

    fn owner(&self) -> Result<OwnerId, TaskError> {
        self.session
            .map(|session| session.owner)
            .ok_or(TaskError::AuthRequired)
    }

    /// Replaces the collection with the backend's current upcoming tasks.
    /// Without a session the collection is emptied and `AuthRequired`
    /// returned.
    #[instrument(skip(self), fields(limit = self.limit))]
    pub async fn load(&self) -> Result<(), TaskError> {
        let owner = match self.owner() {
            Ok(owner) => owner,
            Err(err) => {
                self.state.lock().tasks.clear();
                return Err(err);
            }
        };

        let result = {
            let _loading = LoadingGuard::enter(&self.state);
            self.backend.select(owner, TaskQuery::upcoming(self.limit)).await
        };

        match result {
            Ok(mut tasks) => {
                sort_upcoming(&mut tasks);
                tasks.truncate(self.limit);
                info!(count = tasks.len(), "loaded upcoming tasks");
                self.state.lock().tasks = tasks;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "failed to load tasks");
                Err(TaskError::Fetch(err))
            }
        }
    }

    #[instrument(skip(self, input), fields(title_len = input.title.len()))]
    pub async fn add(&self, input: TaskCreate) -> Result<Task, TaskError> {
        let owner = self.owner()?;
        let task = self
            .backend
            .insert(owner, input)
            .await
            .map_err(TaskError::Create)?;
        self.apply_created(&task);
        info!(id = %task.id, "task created");
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn complete(&self, id: TaskId) -> Result<Task, TaskError> {
        let owner = self.owner()?;
        let task = self
            .backend
            .update_status(owner, id, TaskStatus::Completed)
            .await
            .map_err(TaskError::Update)?;
        let removed = self.apply_removed(id);
        info!(%id, removed, "task completed");
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: TaskId) -> Result<(), TaskError> {
        let owner = self.owner()?;
        self.backend
            .delete(owner, id)
            .await
            .map_err(TaskError::Delete)?;
        let removed = self.apply_removed(id);
        info!(%id, removed, "task deleted");
        Ok(())
    }

    fn apply_created(&self, task: &Task) {
        if task.status != TaskStatus::Pending {
            debug!(id = %task.id, status = ?task.status, "created task is not upcoming");
            return;
        }
        let mut state = self.state.lock();
        match state.tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => state.tasks.push(task.clone()),
        }
        sort_upcoming(&mut state.tasks);
        state.tasks.truncate(self.limit);
    }

    fn apply_removed(&self, id: TaskId) -> bool {
        let mut state = self.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|task| task.id != id);
        state.tasks.len() != before
    }
}

/// Marks a load in flight for as long as it lives.
struct LoadingGuard<'a> {
    state: &'a Mutex<StoreState>,
}

impl<'a> LoadingGuard<'a> {
    fn enter(state: &'a Mutex<StoreState>) -> Self {
        state.lock().loads_in_flight += 1;
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.loads_in_flight = state.loads_in_flight.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::memory::MemoryBackend;

    fn input(title: &str, day: u32) -> TaskCreate {
        TaskCreate::new(title, NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date"))
    }

    fn store_with(backend: &Arc<MemoryBackend>) -> TaskStore {
        let session = Session::new(OwnerId(Uuid::new_v4()));
        TaskStore::new(backend.clone(), Some(session))
    }

    #[tokio::test]
    async fn load_keeps_only_the_soonest_pending_tasks() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend).with_limit(2);
        for day in [9, 2, 5] {
            store.add(input(&format!("day {day}"), day)).await.expect("add");
        }

        store.load().await.expect("load");
        let titles: Vec<String> = store.tasks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["day 2", "day 5"]);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn add_keeps_order_and_bound() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend).with_limit(2);
        store.add(input("late", 20)).await.expect("add");
        store.add(input("early", 1)).await.expect("add");
        store.add(input("middle", 10)).await.expect("add");

        let titles: Vec<String> = store.tasks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["early", "middle"]);
    }

    #[tokio::test]
    async fn failed_load_leaves_previous_contents() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend);
        store.add(input("feed", 1)).await.expect("add");

        backend.set_offline(true);
        let err = store.load().await.expect_err("offline load");
        assert!(matches!(err, TaskError::Fetch(_)));
        assert_eq!(store.tasks().len(), 1);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn missing_session_fails_fast() {
        let backend = Arc::new(MemoryBackend::new());
        let store = TaskStore::new(backend.clone(), None);

        assert!(matches!(store.load().await, Err(TaskError::AuthRequired)));
        assert!(matches!(
            store.add(input("feed", 1)).await,
            Err(TaskError::AuthRequired)
        ));
        assert!(matches!(
            store.complete(TaskId::new()).await,
            Err(TaskError::AuthRequired)
        ));
        assert!(backend.rows().is_empty());
        assert!(store.snapshot().tasks.is_empty());
    }

    #[tokio::test]
    async fn zero_limit_is_clamped() {
        let backend = Arc::new(MemoryBackend::new());
        assert_eq!(store_with(&backend).with_limit(0).limit(), 1);
    }
}
