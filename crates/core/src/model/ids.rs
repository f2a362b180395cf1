use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// Declares a trimmed, non-empty string identifier.
///
/// Identifiers come from the caller layer as raw strings; blank values are
/// rejected with a `ValidationError` naming the field.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Field name reported in validation errors.
            pub const FIELD: &'static str = $field;

            /// Parses a trimmed, non-empty identifier.
            ///
            /// # Errors
            ///
            /// Returns `ValidationError::MissingFields` if the value is blank.
            pub fn parse(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
                let trimmed = raw.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::missing($field));
                }
                Ok(Self(trimmed.to_owned()))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Owner of attempts, mastery records and difficulty states.
    LearnerId,
    "learner_id"
);
string_id!(
    /// A lesson a learner can attempt.
    LessonId,
    "lesson_id"
);
string_id!(
    /// The course a lesson belongs to; mastery is tracked per course.
    CourseId,
    "course_id"
);
string_id!(
    /// A learning outcome whose mastery is estimated.
    OutcomeId,
    "outcome_id"
);
string_id!(
    /// Scope of one difficulty state, typically a skill or question bank.
    PracticeBlockId,
    "practice_block_id"
);

// ─── Attempt Id ────────────────────────────────────────────────────────────────

/// Unique identifier for a learning attempt.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    pub const FIELD: &'static str = "attempt_id";

    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(&self) -> Uuid {
        self.0
    }

    /// Parses an attempt id supplied by the caller layer.
    ///
    /// # Errors
    ///
    /// Returns `MissingFields` for a blank value and `InvalidAttemptId` if the
    /// value is not a UUID.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::missing(Self::FIELD));
        }
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|_| ValidationError::InvalidAttemptId {
                raw: trimmed.to_owned(),
            })
    }
}

impl fmt::Debug for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttemptId({})", self.0)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AttemptId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
