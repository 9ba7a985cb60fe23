//! The operations a view invokes. Each one goes through the store, then
//! reports the outcome as a notice; failures are also returned so callers
//! can react.

use std::error::Error as _;
use std::sync::Arc;

use scaletrack_shared::{Task, TaskCreate, TaskId, TaskSnapshot};
use tracing::instrument;

use crate::error::TaskError;
use crate::notify::{Notice, Notifier};
use crate::store::TaskStore;

pub struct TaskCommands {
    store: Arc<TaskStore>,
    notifier: Arc<dyn Notifier>,
}

impl TaskCommands {
    pub fn new(store: Arc<TaskStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        self.store.snapshot()
    }

    #[instrument(skip(self, input))]
    pub async fn add_task(&self, input: TaskCreate) -> Result<Task, TaskError> {
        let outcome = self.store.add(input).await;
        match &outcome {
            Ok(task) => self
                .notifier
                .notify(Notice::success(format!("Task \"{}\" created", task.title))),
            Err(err) => self.report(err),
        }
        outcome
    }

    #[instrument(skip(self))]
    pub async fn complete_task(&self, id: TaskId) -> Result<Task, TaskError> {
        let outcome = self.store.complete(id).await;
        match &outcome {
            Ok(task) => self
                .notifier
                .notify(Notice::success(format!("Task \"{}\" completed", task.title))),
            Err(err) => self.report(err),
        }
        outcome
    }

    #[instrument(skip(self))]
    pub async fn remove_task(&self, id: TaskId) -> Result<(), TaskError> {
        let outcome = self.store.remove(id).await;
        match &outcome {
            Ok(()) => self.notifier.notify(Notice::success("Task deleted")),
            Err(err) => self.report(err),
        }
        outcome
    }

    #[instrument(skip(self))]
    pub async fn refresh_tasks(&self) -> Result<(), TaskError> {
        let outcome = self.store.load().await;
        if let Err(err) = &outcome {
            self.report(err);
        }
        outcome
    }

    fn report(&self, err: &TaskError) {
        self.notifier.notify(Notice::error(describe(err)));
    }
}

/// One line naming the failure and its underlying cause.
#[must_use]
pub fn describe(err: &TaskError) -> String {
    match err.source() {
        Some(cause) => format!("{err}: {cause}"),
        None => err.to_string(),
    }
}
