//! Error types for task operations.

use scaletrack_shared::TaskId;
use thiserror::Error;

/// Failures reported by a [`crate::backend::TaskBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// No row with this id exists for the caller.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The backend refused the write (table constraint).
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// The backend could not be reached.
    #[error("backend unavailable")]
    Unavailable,

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Errors surfaced by the task store and command layer.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No session identity was supplied.
    #[error("sign in required")]
    AuthRequired,

    #[error("failed to load tasks")]
    Fetch(#[source] BackendError),

    #[error("failed to create task")]
    Create(#[source] BackendError),

    #[error("failed to update task")]
    Update(#[source] BackendError),

    #[error("failed to delete task")]
    Delete(#[source] BackendError),
}

impl TaskError {
    /// The backend failure behind this error, if any.
    #[must_use]
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::AuthRequired => None,
            Self::Fetch(err) | Self::Create(err) | Self::Update(err) | Self::Delete(err) => {
                Some(err)
            }
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.backend(), Some(BackendError::NotFound(_)))
    }
}
