use std::sync::Arc;

use progress_core::ValidationError;
use progress_core::model::{
    AttemptId, AttemptKey, AttemptRecord, AttemptStatus, LearnerId, LessonId,
};
use storage::repository::{AttemptRepository, StorageError};

use super::status::AttemptStatusView;
use crate::Clock;
use crate::error::ProgressError;

/// The attempt a learner should be working in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveAttempt {
    pub attempt_id: AttemptId,
    /// `true` only for the call that created the attempt.
    pub is_new: bool,
}

/// Owns the attempt state machine on top of an `AttemptRepository`.
///
/// Raw identifiers from the caller layer are parsed here; every missing one is
/// reported in a single `ValidationError`. At most one active attempt per
/// (learner, lesson) is guaranteed by the repository's uniqueness check, the
/// lookups below only make the common case cheap.
#[derive(Clone)]
pub struct AttemptLifecycleService {
    clock: Clock,
    attempts: Arc<dyn AttemptRepository>,
}

impl AttemptLifecycleService {
    #[must_use]
    pub fn new(clock: Clock, attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { clock, attempts }
    }

    /// Reports the learner's position in a lesson.
    ///
    /// An unpublished lesson is `locked` whatever the store holds, and is
    /// answered without touching the store.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` for missing identifiers,
    /// `ProgressError::CorruptedState` if the active attempt has no creation
    /// time or more than one attempt is active, and `ProgressError::Storage`
    /// if the lookups fail.
    pub async fn get_status(
        &self,
        lesson_id: &str,
        learner_id: &str,
        is_published: bool,
    ) -> Result<AttemptStatusView, ProgressError> {
        if !is_published {
            return Ok(AttemptStatusView::locked());
        }

        let (lesson_id, learner_id) = parse_pair(lesson_id, learner_id)?;
        let active = self.single_active(&learner_id, &lesson_id).await?;
        let completed = self
            .attempts
            .completed_attempts(&learner_id, &lesson_id)
            .await?;

        let view = match active {
            Some(attempt) => {
                let started_at = attempt.require_created_at().inspect_err(|_| {
                    tracing::warn!(
                        attempt_id = %attempt.id,
                        "active attempt is missing its creation time"
                    );
                })?;
                AttemptStatusView::in_progress(attempt.id, started_at, completed.count)
            }
            None if completed.count > 0 => {
                AttemptStatusView::completed(completed.count, completed.last_completed_at)
            }
            None => AttemptStatusView::never_started(),
        };

        tracing::debug!(
            %learner_id,
            %lesson_id,
            state = ?view.state,
            completed = view.completed_count,
            "resolved attempt status"
        );
        Ok(view)
    }

    /// Returns the active attempt for the pair, creating one if none exists.
    ///
    /// Calling this repeatedly yields the same attempt id, with `is_new` set
    /// only on the call that created it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` naming every missing identifier and
    /// `ProgressError::Storage` if the store fails.
    pub async fn create_or_get_active(
        &self,
        lesson_id: &str,
        learner_id: &str,
        course_id: &str,
    ) -> Result<ActiveAttempt, ProgressError> {
        let key = AttemptKey::parse(lesson_id, learner_id, course_id)?;
        self.ensure_active(&key).await
    }

    /// Typed variant of [`Self::create_or_get_active`].
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CorruptedState` if several attempts are active
    /// and `ProgressError::Storage` if the store fails.
    pub async fn ensure_active(&self, key: &AttemptKey) -> Result<ActiveAttempt, ProgressError> {
        // Re-check right before creating; the store's uniqueness check covers
        // the window between this read and the insert.
        if let Some(existing) = self.single_active(&key.learner_id, &key.lesson_id).await? {
            return Ok(ActiveAttempt {
                attempt_id: existing.id,
                is_new: false,
            });
        }

        let attempt = AttemptRecord::start(key, self.clock.now());
        match self.attempts.insert_attempt(&attempt).await {
            Ok(()) => {
                tracing::info!(
                    attempt_id = %attempt.id,
                    learner_id = %key.learner_id,
                    lesson_id = %key.lesson_id,
                    "created attempt"
                );
                Ok(ActiveAttempt {
                    attempt_id: attempt.id,
                    is_new: true,
                })
            }
            Err(StorageError::Conflict) => {
                tracing::warn!(
                    learner_id = %key.learner_id,
                    lesson_id = %key.lesson_id,
                    "lost attempt creation race; reusing the winner"
                );
                let winner = self
                    .single_active(&key.learner_id, &key.lesson_id)
                    .await?
                    .ok_or(ProgressError::Storage(StorageError::Conflict))?;
                Ok(ActiveAttempt {
                    attempt_id: winner.id,
                    is_new: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetches an attempt and checks that `learner_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` if the attempt does not exist and
    /// `ProgressError::Ownership` if it belongs to someone else.
    pub async fn validate_ownership(
        &self,
        attempt_id: &str,
        learner_id: &str,
    ) -> Result<AttemptRecord, ProgressError> {
        let (attempt_id, learner_id) = match (
            AttemptId::parse(attempt_id),
            LearnerId::parse(learner_id),
        ) {
            (Ok(id), Ok(learner)) => (id, learner),
            (
                Err(ValidationError::MissingFields { mut fields }),
                Err(ValidationError::MissingFields { fields: more }),
            ) => {
                fields.extend(more);
                return Err(ValidationError::MissingFields { fields }.into());
            }
            (Err(err), _) | (_, Err(err)) => return Err(err.into()),
        };
        self.owned_attempt(attempt_id, &learner_id).await
    }

    /// Abandons `active_attempt_id` and returns the id of a fresh active attempt.
    ///
    /// Retrying after the attempt was already abandoned skips straight to
    /// creation, so the call can be repeated safely.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` for missing identifiers, a completed
    /// attempt, or an attempt from another lesson; `ProgressError::NotFound`
    /// and `ProgressError::Ownership` from the ownership guard.
    pub async fn abandon_and_restart(
        &self,
        active_attempt_id: &str,
        learner_id: &str,
        lesson_id: &str,
        course_id: &str,
    ) -> Result<AttemptId, ProgressError> {
        let (attempt_id, key) = match (
            AttemptId::parse(active_attempt_id),
            AttemptKey::parse(lesson_id, learner_id, course_id),
        ) {
            (Ok(id), Ok(key)) => (id, key),
            (
                Err(ValidationError::MissingFields { mut fields }),
                Err(ValidationError::MissingFields { fields: more }),
            ) => {
                fields.extend(more);
                return Err(ValidationError::MissingFields { fields }.into());
            }
            (Err(err), _) | (_, Err(err)) => return Err(err.into()),
        };

        let mut attempt = self.owned_attempt(attempt_id, &key.learner_id).await?;
        if attempt.lesson_id != key.lesson_id {
            return Err(ValidationError::InvalidAttemptState {
                reason: format!(
                    "attempt {} belongs to lesson {}, not {}",
                    attempt.id, attempt.lesson_id, key.lesson_id
                ),
            }
            .into());
        }

        if attempt.status != AttemptStatus::Abandoned {
            attempt.transition(AttemptStatus::Abandoned, self.clock.now())?;
            self.attempts.update_attempt(&attempt).await?;
            tracing::info!(
                attempt_id = %attempt.id,
                learner_id = %key.learner_id,
                lesson_id = %key.lesson_id,
                "abandoned attempt"
            );
        }

        let next = self.ensure_active(&key).await?;
        Ok(next.attempt_id)
    }

    /// Marks an active attempt completed at the service clock's time.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` if the attempt is not active, plus
    /// the ownership guard's errors.
    pub async fn complete_attempt(
        &self,
        attempt_id: &str,
        learner_id: &str,
    ) -> Result<AttemptRecord, ProgressError> {
        let mut attempt = self.validate_ownership(attempt_id, learner_id).await?;
        attempt.transition(AttemptStatus::Completed, self.clock.now())?;
        self.attempts.update_attempt(&attempt).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            learner_id = %attempt.learner_id,
            lesson_id = %attempt.lesson_id,
            "completed attempt"
        );
        Ok(attempt)
    }

    /// Every attempt for the pair, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` for missing identifiers and
    /// `ProgressError::Storage` if the lookup fails.
    pub async fn history(
        &self,
        lesson_id: &str,
        learner_id: &str,
    ) -> Result<Vec<AttemptRecord>, ProgressError> {
        let (lesson_id, learner_id) = parse_pair(lesson_id, learner_id)?;
        Ok(self
            .attempts
            .attempt_history(&learner_id, &lesson_id)
            .await?)
    }

    async fn owned_attempt(
        &self,
        attempt_id: AttemptId,
        learner_id: &LearnerId,
    ) -> Result<AttemptRecord, ProgressError> {
        let attempt = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| ProgressError::NotFound(format!("attempt {attempt_id}")))?;

        if !attempt.is_owned_by(learner_id) {
            tracing::warn!(
                %attempt_id,
                %learner_id,
                "ownership check failed"
            );
            return Err(ProgressError::Ownership {
                attempt_id,
                learner_id: learner_id.clone(),
            });
        }
        Ok(attempt)
    }

    async fn single_active(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Option<AttemptRecord>, ProgressError> {
        let mut active = self
            .attempts
            .find_active_attempts(learner_id, lesson_id)
            .await?;
        if active.len() > 1 {
            tracing::warn!(
                %learner_id,
                %lesson_id,
                count = active.len(),
                "multiple active attempts"
            );
            return Err(ProgressError::CorruptedState(format!(
                "{} active attempts for learner {learner_id} in lesson {lesson_id}",
                active.len()
            )));
        }
        Ok(active.pop())
    }
}

fn parse_pair(
    lesson_id: &str,
    learner_id: &str,
) -> Result<(LessonId, LearnerId), ValidationError> {
    match (LessonId::parse(lesson_id), LearnerId::parse(learner_id)) {
        (Ok(lesson), Ok(learner)) => Ok((lesson, learner)),
        (
            Err(ValidationError::MissingFields { mut fields }),
            Err(ValidationError::MissingFields { fields: more }),
        ) => {
            fields.extend(more);
            Err(ValidationError::MissingFields { fields })
        }
        (Err(err), _) | (_, Err(err)) => Err(err),
    }
}
