use thiserror::Error;

/// Malformed or missing input. Always raised immediately, never defaulted.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("missing required field(s): {}", .fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },

    #[error("invalid attempt id: {raw}")]
    InvalidAttemptId { raw: String },

    #[error("smoothing factor must be in the open interval (0, 1), got {provided}")]
    AlphaOutOfRange { provided: f64 },

    #[error("observed score must be a finite value in [0, 1], got {provided}")]
    ScoreOutOfRange { provided: f64 },

    #[error("stored mastery must be a finite value within the configured bounds, got {provided}")]
    PriorOutOfRange { provided: f64 },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("no graded outcomes were submitted")]
    EmptyObservations,

    /// The attempt exists but is in the wrong state for the request.
    #[error("invalid attempt state: {reason}")]
    InvalidAttemptState { reason: String },
}

impl ValidationError {
    #[must_use]
    pub fn missing(field: &'static str) -> Self {
        Self::MissingFields {
            fields: vec![field],
        }
    }

    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
