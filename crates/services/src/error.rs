//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::ValidationError;
use progress_core::model::{AttemptError, AttemptId, LearnerId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the attempt lifecycle and progress services.
///
/// None of these are retried or swallowed; the caller layer maps them to
/// user-facing messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("attempt {attempt_id} does not belong to learner {learner_id}")]
    Ownership {
        attempt_id: AttemptId,
        learner_id: LearnerId,
    },

    #[error("corrupted state: {0}")]
    CorruptedState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ProgressError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ProgressError::NotFound("record".into()),
            StorageError::Serialization(detail) => ProgressError::CorruptedState(detail),
            other => ProgressError::Storage(other),
        }
    }
}

impl From<AttemptError> for ProgressError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::InvalidTransition { .. } => {
                ProgressError::Validation(ValidationError::InvalidAttemptState {
                    reason: err.to_string(),
                })
            }
            other => ProgressError::CorruptedState(other.to_string()),
        }
    }
}

/// Errors emitted while assembling a `ProgressEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineInitError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::AttemptStatus;

    #[test]
    fn storage_errors_map_onto_the_taxonomy() {
        assert!(matches!(
            ProgressError::from(StorageError::NotFound),
            ProgressError::NotFound(_)
        ));
        assert!(matches!(
            ProgressError::from(StorageError::Serialization("bad json".into())),
            ProgressError::CorruptedState(detail) if detail == "bad json"
        ));
        assert!(matches!(
            ProgressError::from(StorageError::Conflict),
            ProgressError::Storage(StorageError::Conflict)
        ));
        assert!(matches!(
            ProgressError::from(StorageError::Connection("down".into())),
            ProgressError::Storage(StorageError::Connection(_))
        ));
    }

    #[test]
    fn attempt_errors_split_between_validation_and_corruption() {
        let id = AttemptId::generate();
        assert!(matches!(
            ProgressError::from(AttemptError::MissingCreatedAt { attempt_id: id }),
            ProgressError::CorruptedState(_)
        ));
        assert!(matches!(
            ProgressError::from(AttemptError::InvalidTransition {
                attempt_id: id,
                from: AttemptStatus::Completed,
                to: AttemptStatus::Abandoned,
            }),
            ProgressError::Validation(ValidationError::InvalidAttemptState { .. })
        ));
    }
}
