//! Worker process state models.
//!
//! This module defines the structures for tracking one spawned external
//! worker process, both while it runs and as a history record afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ts_rs::TS;
use uuid::Uuid;

/// Lifecycle status of a spawned worker process.
///
/// A worker starts in `Running` and moves to exactly one terminal state:
/// - Finished: exited with code 0 (or was force-finished)
/// - Failed: exited with a non-zero code or was killed by a signal
/// - Error: could not be launched at all
/// - Stopped: termination was requested by a caller
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Running,
    Finished,
    Failed,
    Error,
    Stopped,
}

impl WorkerStatus {
    /// Whether the worker has left the `Running` state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkerStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Running => "running",
            WorkerStatus::Finished => "finished",
            WorkerStatus::Failed => "failed",
            WorkerStatus::Error => "error",
            WorkerStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full snapshot of a worker process.
///
/// This is the shape stored in the history ledger, so it must stay readable
/// after the supervisor that produced it has restarted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    /// Unique identifier generated when the job is created.
    #[ts(type = "string")]
    pub id: Uuid,

    /// Executable that was launched.
    pub command: String,

    /// Positional arguments passed to the executable.
    pub args: Vec<String>,

    /// Working directory of the child, if one was set.
    #[ts(type = "string | null")]
    pub working_directory: Option<PathBuf>,

    /// Free-form caller label, usually the artifact the job operates on.
    #[serde(default)]
    pub tag: Option<String>,

    pub status: WorkerStatus,

    #[ts(type = "string")]
    pub start_time: DateTime<Utc>,

    /// `None` while the worker is running.
    #[ts(type = "string | null")]
    pub finish_time: Option<DateTime<Utc>>,

    /// Exit code reported by the OS, when there was one.
    #[serde(default)]
    pub exit_code: Option<i32>,

    /// Combined stdout/stderr, in arrival order, plus trailer lines.
    #[serde(default)]
    pub log: String,

    #[serde(default)]
    pub result_path: Option<String>,

    #[serde(default)]
    pub product_url: Option<String>,
}

impl WorkerRecord {
    /// Summary view without the captured log.
    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            id: self.id,
            command: self.command.clone(),
            tag: self.tag.clone(),
            status: self.status,
            start_time: self.start_time,
            finish_time: self.finish_time,
            result_path: self.result_path.clone(),
            product_url: self.product_url.clone(),
        }
    }
}

/// Lightweight listing entry for a worker, used by job and history listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSummary {
    #[ts(type = "string")]
    pub id: Uuid,
    pub command: String,
    pub tag: Option<String>,
    pub status: WorkerStatus,
    #[ts(type = "string")]
    pub start_time: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub finish_time: Option<DateTime<Utc>>,
    pub result_path: Option<String>,
    pub product_url: Option<String>,
}
