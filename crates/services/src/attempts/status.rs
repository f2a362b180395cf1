use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use progress_core::model::{AttemptId, AttemptStatus};

/// Learner-facing state of a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    NeverStarted,
    InProgress,
    Completed,
    Locked,
}

impl AttemptState {
    /// The attempt status string this state reports.
    #[must_use]
    pub fn status(self) -> AttemptStatus {
        match self {
            AttemptState::NeverStarted => AttemptStatus::NeverStarted,
            AttemptState::InProgress => AttemptStatus::Active,
            AttemptState::Completed => AttemptStatus::Completed,
            AttemptState::Locked => AttemptStatus::Locked,
        }
    }
}

/// What the caller should offer next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptAction {
    Start,
    Continue,
    Retake,
    Locked,
}

/// Answer to "where is this learner in this lesson?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptStatusView {
    pub state: AttemptState,
    pub action: AttemptAction,
    pub active_attempt_id: Option<AttemptId>,
    pub completed_count: u32,
    pub last_activity: Option<DateTime<Utc>>,
}

impl AttemptStatusView {
    #[must_use]
    pub fn locked() -> Self {
        Self {
            state: AttemptState::Locked,
            action: AttemptAction::Locked,
            active_attempt_id: None,
            completed_count: 0,
            last_activity: None,
        }
    }

    pub(crate) fn in_progress(
        attempt_id: AttemptId,
        started_at: DateTime<Utc>,
        completed_count: u32,
    ) -> Self {
        Self {
            state: AttemptState::InProgress,
            action: AttemptAction::Continue,
            active_attempt_id: Some(attempt_id),
            completed_count,
            last_activity: Some(started_at),
        }
    }

    pub(crate) fn completed(
        completed_count: u32,
        last_completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            state: AttemptState::Completed,
            action: AttemptAction::Retake,
            active_attempt_id: None,
            completed_count,
            last_activity: last_completed_at,
        }
    }

    pub(crate) fn never_started() -> Self {
        Self {
            state: AttemptState::NeverStarted,
            action: AttemptAction::Start,
            active_attempt_id: None,
            completed_count: 0,
            last_activity: None,
        }
    }
}
