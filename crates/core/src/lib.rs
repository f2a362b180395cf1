#![forbid(unsafe_code)]

//! Pure domain layer of the progress engine: identifiers, persisted record
//! shapes, the EMA mastery estimator and the adaptive difficulty controller.

pub mod difficulty;
pub mod error;
pub mod mastery;
pub mod model;
pub mod time;

pub use error::ValidationError;
pub use time::Clock;
