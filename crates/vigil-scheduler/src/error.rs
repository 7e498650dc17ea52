//! Scheduler error types.

use thiserror::Error;

/// Errors surfaced to callers that register or reload jobs.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is not running")]
    NotRunning,

    #[error("invalid interval for endpoint {0}: must be greater than zero")]
    InvalidInterval(String),

    #[error("no async runtime available to register timer")]
    NoRuntime,

    #[error("state store error: {0}")]
    State(#[from] vigil_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
