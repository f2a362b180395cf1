use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    AttemptId, AttemptRecord, AttemptStatus, CourseId, DifficultyState, LearnerId, LessonId,
    MasteryRecord, PracticeBlockId, StudentHistory,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A uniqueness guarantee rejected the write, e.g. a second active attempt.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Completed-attempt totals for one (learner, lesson).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletedAttempts {
    pub count: u32,
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// Repository contract for attempt records.
///
/// Implementations must reject a second `active` attempt for the same
/// (learner, lesson) with `StorageError::Conflict`. That store-side guarantee
/// is what makes "at most one active attempt" hold under concurrent creation.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Attempts in status `active` for the pair. At most one is expected.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_active_attempts(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Vec<AttemptRecord>, StorageError>;

    /// Count and latest completion time of `completed` attempts for the pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn completed_attempts(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<CompletedAttempts, StorageError>;

    /// Every attempt for the pair, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn attempt_history(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Vec<AttemptRecord>, StorageError>;

    /// Insert a new attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if it would create a second active
    /// attempt for the pair (or reuse an id).
    async fn insert_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError>;

    /// Fetch an attempt by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_attempt(&self, id: AttemptId) -> Result<Option<AttemptRecord>, StorageError>;

    /// Overwrite status and timestamps of an existing attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn update_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError>;
}

#[async_trait]
pub trait MasteryRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored document is corrupt.
    async fn get_mastery(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<MasteryRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_mastery(&self, record: &MasteryRecord) -> Result<(), StorageError>;
}

#[async_trait]
pub trait DifficultyRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored state is invalid.
    async fn get_difficulty(
        &self,
        learner_id: &LearnerId,
        block_id: &PracticeBlockId,
    ) -> Result<Option<DifficultyState>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the state cannot be stored.
    async fn save_difficulty(
        &self,
        learner_id: &LearnerId,
        block_id: &PracticeBlockId,
        state: &DifficultyState,
    ) -> Result<(), StorageError>;

    /// Lifetime totals for a learner; zeros when nothing is stored yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_history(&self, learner_id: &LearnerId) -> Result<StudentHistory, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the history cannot be stored.
    async fn save_history(
        &self,
        learner_id: &LearnerId,
        history: &StudentHistory,
    ) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Enforces the one-active-attempt rule under its lock, the same way the
/// SQLite adapter does with a partial unique index.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    attempts: Arc<Mutex<HashMap<AttemptId, AttemptRecord>>>,
    mastery: Arc<Mutex<HashMap<(LearnerId, CourseId), MasteryRecord>>>,
    difficulty: Arc<Mutex<HashMap<(LearnerId, PracticeBlockId), DifficultyState>>>,
    history: Arc<Mutex<HashMap<LearnerId, StudentHistory>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn matches_pair(attempt: &AttemptRecord, learner_id: &LearnerId, lesson_id: &LessonId) -> bool {
    &attempt.learner_id == learner_id && &attempt.lesson_id == lesson_id
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn find_active_attempts(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|a| matches_pair(a, learner_id, lesson_id) && a.is_active())
            .cloned()
            .collect())
    }

    async fn completed_attempts(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<CompletedAttempts, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        let mut summary = CompletedAttempts::default();
        for attempt in guard.values().filter(|a| {
            matches_pair(a, learner_id, lesson_id) && a.status == AttemptStatus::Completed
        }) {
            summary.count = summary.count.saturating_add(1);
            summary.last_completed_at = summary.last_completed_at.max(attempt.completed_at);
        }
        Ok(summary)
    }

    async fn attempt_history(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        let mut attempts: Vec<_> = guard
            .values()
            .filter(|a| matches_pair(a, learner_id, lesson_id))
            .cloned()
            .collect();
        attempts.sort_by_key(|a| (a.created_at, a.id));
        Ok(attempts)
    }

    async fn insert_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        let mut guard = self.attempts.lock().map_err(poisoned)?;
        if guard.contains_key(&attempt.id) {
            return Err(StorageError::Conflict);
        }
        if attempt.is_active()
            && guard
                .values()
                .any(|a| a.is_active() && matches_pair(a, &attempt.learner_id, &attempt.lesson_id))
        {
            return Err(StorageError::Conflict);
        }
        guard.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<AttemptRecord>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn update_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        let mut guard = self.attempts.lock().map_err(poisoned)?;
        if !guard.contains_key(&attempt.id) {
            return Err(StorageError::NotFound);
        }
        if attempt.is_active()
            && guard.values().any(|a| {
                a.id != attempt.id
                    && a.is_active()
                    && matches_pair(a, &attempt.learner_id, &attempt.lesson_id)
            })
        {
            return Err(StorageError::Conflict);
        }
        guard.insert(attempt.id, attempt.clone());
        Ok(())
    }
}

#[async_trait]
impl MasteryRepository for InMemoryRepository {
    async fn get_mastery(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<MasteryRecord>, StorageError> {
        let guard = self.mastery.lock().map_err(poisoned)?;
        Ok(guard.get(&(learner_id.clone(), course_id.clone())).cloned())
    }

    async fn save_mastery(&self, record: &MasteryRecord) -> Result<(), StorageError> {
        let mut guard = self.mastery.lock().map_err(poisoned)?;
        guard.insert(
            (record.learner_id().clone(), record.course_id().clone()),
            record.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl DifficultyRepository for InMemoryRepository {
    async fn get_difficulty(
        &self,
        learner_id: &LearnerId,
        block_id: &PracticeBlockId,
    ) -> Result<Option<DifficultyState>, StorageError> {
        let guard = self.difficulty.lock().map_err(poisoned)?;
        Ok(guard.get(&(learner_id.clone(), block_id.clone())).copied())
    }

    async fn save_difficulty(
        &self,
        learner_id: &LearnerId,
        block_id: &PracticeBlockId,
        state: &DifficultyState,
    ) -> Result<(), StorageError> {
        let mut guard = self.difficulty.lock().map_err(poisoned)?;
        guard.insert((learner_id.clone(), block_id.clone()), *state);
        Ok(())
    }

    async fn get_history(&self, learner_id: &LearnerId) -> Result<StudentHistory, StorageError> {
        let guard = self.history.lock().map_err(poisoned)?;
        Ok(guard.get(learner_id).copied().unwrap_or_default())
    }

    async fn save_history(
        &self,
        learner_id: &LearnerId,
        history: &StudentHistory,
    ) -> Result<(), StorageError> {
        let mut guard = self.history.lock().map_err(poisoned)?;
        guard.insert(learner_id.clone(), *history);
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub attempts: Arc<dyn AttemptRepository>,
    pub mastery: Arc<dyn MasteryRepository>,
    pub difficulty: Arc<dyn DifficultyRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo.clone());
        let mastery: Arc<dyn MasteryRepository> = Arc::new(repo.clone());
        let difficulty: Arc<dyn DifficultyRepository> = Arc::new(repo);
        Self {
            attempts,
            mastery,
            difficulty,
        }
    }
}
