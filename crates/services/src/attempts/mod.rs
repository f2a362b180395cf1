//! Attempt lifecycle: status reporting, idempotent creation, ownership
//! guards and abandon/restart.

mod service;
mod status;

pub use service::{ActiveAttempt, AttemptLifecycleService};
pub use status::{AttemptAction, AttemptState, AttemptStatusView};
