#![forbid(unsafe_code)]

pub mod attempts;
pub mod config;
pub mod engine;
pub mod error;
pub mod progress;

pub use progress_core::Clock;

pub use attempts::{
    ActiveAttempt, AttemptAction, AttemptLifecycleService, AttemptState, AttemptStatusView,
};
pub use config::EngineConfig;
pub use engine::ProgressEngine;
pub use error::{EngineInitError, ProgressError};
pub use progress::{ProgressService, Submission, SubmissionOutcome};
