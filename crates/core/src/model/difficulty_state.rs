use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum DifficultyStateError {
    #[error("unknown difficulty level: {0}")]
    UnknownLevel(String),

    #[error("correct ({correct}) and incorrect ({incorrect}) streaks are both positive")]
    ConflictingStreaks { correct: u32, incorrect: u32 },

    #[error("confidence score must be finite and non-negative, got {0}")]
    InvalidConfidenceScore(f64),

    #[error("history has more correct answers ({correct}) than questions ({total})")]
    InvalidHistory { total: u32, correct: u32 },
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

/// Question difficulty tier, ordered `Easy < Medium < Hard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    /// The next tier up, or `None` at `Hard`.
    #[must_use]
    pub fn upgrade(self) -> Option<Self> {
        match self {
            DifficultyLevel::Easy => Some(DifficultyLevel::Medium),
            DifficultyLevel::Medium => Some(DifficultyLevel::Hard),
            DifficultyLevel::Hard => None,
        }
    }

    /// The next tier down, or `None` at `Easy`.
    #[must_use]
    pub fn downgrade(self) -> Option<Self> {
        match self {
            DifficultyLevel::Easy => None,
            DifficultyLevel::Medium => Some(DifficultyLevel::Easy),
            DifficultyLevel::Hard => Some(DifficultyLevel::Medium),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
        }
    }

    /// # Errors
    ///
    /// Returns `DifficultyStateError::UnknownLevel` for anything but
    /// `easy`, `medium` or `hard`.
    pub fn parse(raw: &str) -> Result<Self, DifficultyStateError> {
        match raw {
            "easy" => Ok(DifficultyLevel::Easy),
            "medium" => Ok(DifficultyLevel::Medium),
            "hard" => Ok(DifficultyLevel::Hard),
            other => Err(DifficultyStateError::UnknownLevel(other.to_owned())),
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Adaptive difficulty state for one (learner, practice block).
///
/// At most one of the two streak counters is positive at any time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DifficultyState {
    pub level: DifficultyLevel,
    pub consecutive_correct: u32,
    pub consecutive_incorrect: u32,
    /// Weighted correct-answer streak, used when confidence weighting is on.
    pub confidence_score: f64,
}

impl DifficultyState {
    #[must_use]
    pub fn at_level(level: DifficultyLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Rehydrate a state from the store, checking its invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingStreaks` if both counters are positive and
    /// `InvalidConfidenceScore` for a negative or non-finite score.
    pub fn from_persisted(
        level: DifficultyLevel,
        consecutive_correct: u32,
        consecutive_incorrect: u32,
        confidence_score: f64,
    ) -> Result<Self, DifficultyStateError> {
        if consecutive_correct > 0 && consecutive_incorrect > 0 {
            return Err(DifficultyStateError::ConflictingStreaks {
                correct: consecutive_correct,
                incorrect: consecutive_incorrect,
            });
        }
        if !confidence_score.is_finite() || confidence_score < 0.0 {
            return Err(DifficultyStateError::InvalidConfidenceScore(confidence_score));
        }
        Ok(Self {
            level,
            consecutive_correct,
            consecutive_incorrect,
            confidence_score,
        })
    }
}

//
// ─── ANSWER ────────────────────────────────────────────────────────────────────
//

/// A graded answer as seen by the difficulty controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub is_correct: bool,
    pub response_time_seconds: Option<f64>,
    pub hints_used: Option<u32>,
}

impl AnswerEvent {
    #[must_use]
    pub fn correct() -> Self {
        Self {
            is_correct: true,
            response_time_seconds: None,
            hints_used: None,
        }
    }

    #[must_use]
    pub fn incorrect() -> Self {
        Self {
            is_correct: false,
            ..Self::correct()
        }
    }

    #[must_use]
    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_hints(mut self, hints: u32) -> Self {
        self.hints_used = Some(hints);
        self
    }
}

//
// ─── HISTORY ───────────────────────────────────────────────────────────────────
//

/// Lifetime answer totals for a learner, used for personalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudentHistory {
    pub total_questions: u32,
    pub total_correct: u32,
}

impl StudentHistory {
    /// # Errors
    ///
    /// Returns `DifficultyStateError::InvalidHistory` if `total_correct`
    /// exceeds `total_questions`.
    pub fn new(total_questions: u32, total_correct: u32) -> Result<Self, DifficultyStateError> {
        if total_correct > total_questions {
            return Err(DifficultyStateError::InvalidHistory {
                total: total_questions,
                correct: total_correct,
            });
        }
        Ok(Self {
            total_questions,
            total_correct,
        })
    }

    /// Fraction answered correctly; `None` with no answers.
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        (self.total_questions > 0)
            .then(|| f64::from(self.total_correct) / f64::from(self.total_questions))
    }

    pub fn record(&mut self, is_correct: bool) {
        self.total_questions = self.total_questions.saturating_add(1);
        if is_correct {
            self.total_correct = self.total_correct.saturating_add(1);
        }
    }
}
