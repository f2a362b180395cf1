use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::ValidationError;
use crate::model::ids::{AttemptId, CourseId, LearnerId, LessonId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt {attempt_id} has no creation timestamp")]
    MissingCreatedAt { attempt_id: AttemptId },

    #[error("attempt {attempt_id} cannot move from {from} to {to}")]
    InvalidTransition {
        attempt_id: AttemptId,
        from: AttemptStatus,
        to: AttemptStatus,
    },

    #[error("unknown attempt status: {0}")]
    UnknownStatus(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle status of an attempt.
///
/// Only `Active`, `Completed` and `Abandoned` are ever written to the store;
/// `NeverStarted` and `Locked` are derived when reporting status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NeverStarted,
    Active,
    Completed,
    Abandoned,
    Locked,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::NeverStarted => "never_started",
            AttemptStatus::Active => "active",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
            AttemptStatus::Locked => "locked",
        }
    }

    /// Parses the store's status string.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnknownStatus` for anything else.
    pub fn parse(raw: &str) -> Result<Self, AttemptError> {
        match raw {
            "never_started" => Ok(AttemptStatus::NeverStarted),
            "active" => Ok(AttemptStatus::Active),
            "completed" => Ok(AttemptStatus::Completed),
            "abandoned" => Ok(AttemptStatus::Abandoned),
            "locked" => Ok(AttemptStatus::Locked),
            other => Err(AttemptError::UnknownStatus(other.to_owned())),
        }
    }

    fn can_become(self, next: AttemptStatus) -> bool {
        matches!(
            (self, next),
            (AttemptStatus::NeverStarted, AttemptStatus::Active)
                | (
                    AttemptStatus::Active,
                    AttemptStatus::Completed | AttemptStatus::Abandoned
                )
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ATTEMPT KEY ───────────────────────────────────────────────────────────────
//

/// The (learner, lesson, course) triple an attempt is created for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    pub learner_id: LearnerId,
    pub lesson_id: LessonId,
    pub course_id: CourseId,
}

impl AttemptKey {
    /// Validates raw identifiers, reporting every blank one at once.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingFields` listing each missing field.
    pub fn parse(
        lesson_id: &str,
        learner_id: &str,
        course_id: &str,
    ) -> Result<Self, ValidationError> {
        let lesson = LessonId::parse(lesson_id).ok();
        let learner = LearnerId::parse(learner_id).ok();
        let course = CourseId::parse(course_id).ok();

        match (lesson, learner, course) {
            (Some(lesson_id), Some(learner_id), Some(course_id)) => Ok(Self {
                learner_id,
                lesson_id,
                course_id,
            }),
            (lesson, learner, course) => {
                let mut fields = Vec::new();
                if lesson.is_none() {
                    fields.push(LessonId::FIELD);
                }
                if learner.is_none() {
                    fields.push(LearnerId::FIELD);
                }
                if course.is_none() {
                    fields.push(CourseId::FIELD);
                }
                Err(ValidationError::MissingFields { fields })
            }
        }
    }
}

//
// ─── ATTEMPT RECORD ────────────────────────────────────────────────────────────
//

/// One learning attempt, in the shape the external store keeps it.
///
/// `created_at` is optional because the store does not enforce it; an active
/// attempt without one is corrupted and is reported, never repaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: AttemptId,
    pub learner_id: LearnerId,
    pub lesson_id: LessonId,
    pub course_id: CourseId,
    pub status: AttemptStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    /// A fresh `active` attempt for the given key.
    #[must_use]
    pub fn start(key: &AttemptKey, now: DateTime<Utc>) -> Self {
        Self {
            id: AttemptId::generate(),
            learner_id: key.learner_id.clone(),
            lesson_id: key.lesson_id.clone(),
            course_id: key.course_id.clone(),
            status: AttemptStatus::Active,
            created_at: Some(now),
            completed_at: None,
        }
    }

    /// Creation timestamp, failing if the store lost it.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::MissingCreatedAt`.
    pub fn require_created_at(&self) -> Result<DateTime<Utc>, AttemptError> {
        self.created_at
            .ok_or(AttemptError::MissingCreatedAt { attempt_id: self.id })
    }

    #[must_use]
    pub fn is_owned_by(&self, learner_id: &LearnerId) -> bool {
        &self.learner_id == learner_id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AttemptStatus::Active
    }

    /// Most recent timestamp on the record.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.created_at)
    }

    /// Moves the attempt to `next`, stamping `completed_at` on completion.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTransition` unless the move is
    /// `never_started → active` or `active → completed | abandoned`.
    pub fn transition(
        &mut self,
        next: AttemptStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        if !self.status.can_become(next) {
            return Err(AttemptError::InvalidTransition {
                attempt_id: self.id,
                from: self.status,
                to: next,
            });
        }
        match next {
            AttemptStatus::Active => {
                self.created_at.get_or_insert(at);
            }
            AttemptStatus::Completed => self.completed_at = Some(at),
            _ => {}
        }
        self.status = next;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn key() -> AttemptKey {
        AttemptKey::parse("lesson-1", "learner-1", "course-1").unwrap()
    }

    #[test]
    fn key_reports_all_missing_fields() {
        let err = AttemptKey::parse("", "learner-1", " ").unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields {
                fields: vec!["lesson_id", "course_id"]
            }
        );
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            AttemptStatus::NeverStarted,
            AttemptStatus::Active,
            AttemptStatus::Completed,
            AttemptStatus::Abandoned,
            AttemptStatus::Locked,
        ] {
            assert_eq!(AttemptStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(matches!(
            AttemptStatus::parse("paused"),
            Err(AttemptError::UnknownStatus(_))
        ));
    }

    #[test]
    fn start_creates_active_attempt() {
        let attempt = AttemptRecord::start(&key(), fixed_now());
        assert!(attempt.is_active());
        assert_eq!(attempt.require_created_at().unwrap(), fixed_now());
        assert_eq!(attempt.last_activity(), Some(fixed_now()));
    }

    #[test]
    fn complete_stamps_completed_at() {
        let mut attempt = AttemptRecord::start(&key(), fixed_now());
        let later = fixed_now() + chrono::Duration::minutes(20);
        attempt.transition(AttemptStatus::Completed, later).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Completed);
        assert_eq!(attempt.completed_at, Some(later));
        assert_eq!(attempt.last_activity(), Some(later));
    }

    #[test]
    fn terminal_attempts_cannot_move() {
        let mut attempt = AttemptRecord::start(&key(), fixed_now());
        attempt
            .transition(AttemptStatus::Abandoned, fixed_now())
            .unwrap();
        let err = attempt
            .transition(AttemptStatus::Completed, fixed_now())
            .unwrap_err();
        assert!(matches!(
            err,
            AttemptError::InvalidTransition {
                from: AttemptStatus::Abandoned,
                to: AttemptStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn missing_created_at_is_reported() {
        let mut attempt = AttemptRecord::start(&key(), fixed_now());
        attempt.created_at = None;
        assert!(matches!(
            attempt.require_created_at(),
            Err(AttemptError::MissingCreatedAt { .. })
        ));
    }

    #[test]
    fn ownership_check() {
        let attempt = AttemptRecord::start(&key(), fixed_now());
        assert!(attempt.is_owned_by(&LearnerId::parse("learner-1").unwrap()));
        assert!(!attempt.is_owned_by(&LearnerId::parse("learner-2").unwrap()));
    }
}
