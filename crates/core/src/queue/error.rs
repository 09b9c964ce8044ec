//! Reasons a queue entry cannot be launched.

use pq_protocol::queue_models::StageType;
use std::path::PathBuf;
use thiserror::Error;

/// Why dispatching an entry ended in the `error` state.
///
/// These never reach callers of the queue; they are logged and the entry's
/// status records the outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No worker configured for stage '{0}'")]
    NoWorker(StageType),

    #[error("Worker executable not found: {0:?}")]
    WorkerMissing(PathBuf),

    #[error("Input file not found: {0:?}")]
    InputMissing(PathBuf),

    #[error("No listing reference for '{0}'")]
    ListingUnresolved(String),

    #[error("Failed to launch worker: {0}")]
    Launch(String),
}
