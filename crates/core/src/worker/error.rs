//! Error types for worker supervision.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned to callers of the supervisor.
///
/// Launch failures are not errors here: a worker that cannot be spawned is
/// still created and ends in the `error` status with the reason in its log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("Command must not be empty")]
    EmptyCommand,

    #[error("Worker {0} not found")]
    NotFound(Uuid),
}
