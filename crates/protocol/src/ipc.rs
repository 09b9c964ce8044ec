//! Communication protocol between the supervisor and its callers.
//!
//! The protocol follows an Operation/Event pattern:
//! - `Op`: commands sent by a caller (the HTTP layer, the CLI) to the core
//! - `Reply`: the direct answer to one `Op`
//! - `Event`: unsolicited status updates published by the core
//!
//! Uses tagged enum serialization so each message is one JSON object:
//! ```json
//! { "type": "enqueue", "payload": { "file": "cat.png", "stage": "upscale" } }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::queue_models::{EnqueueRequest, EntryPage, EntryView, PipelineEntry};
use crate::worker_models::{WorkerRecord, WorkerStatus, WorkerSummary};

/// Operations a caller can request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Op {
    /// Add an entry to the queue.
    Enqueue(EnqueueRequest),

    /// List every entry in dispatch order.
    List,

    /// List a page of entries grouped by artifact.
    ListPage { limit: usize, offset: usize },

    /// Remove one entry, stopping its worker if it is running.
    #[serde(rename_all = "camelCase")]
    Remove {
        #[ts(type = "string")]
        entry_id: Uuid,
    },

    /// Remove every entry referring to an artifact record.
    #[serde(rename_all = "camelCase")]
    RemoveByRecord {
        #[ts(type = "number")]
        record_id: i64,
    },

    /// Remove entries in a terminal state.
    RemoveFinished,

    /// Requeue failed and errored entries.
    RetryFailed,

    /// Set a new order for the queued entries.
    Reorder {
        #[ts(type = "Array<string>")]
        ids: Vec<Uuid>,
    },

    Pause,

    Resume,

    /// Query whether the queue is paused.
    GetState,

    /// Stop the running worker and clear the queue.
    StopAll,

    /// List workers known to this supervisor instance.
    ListJobs,

    /// List the persisted worker history.
    ListHistory,

    /// Fetch one worker record including its log.
    #[serde(rename_all = "camelCase")]
    GetJob {
        #[ts(type = "string")]
        worker_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    StopJob {
        #[ts(type = "string")]
        worker_id: Uuid,
    },

    /// Mark a worker finished even though its exit was never observed.
    #[serde(rename_all = "camelCase")]
    ForceFinishJob {
        #[ts(type = "string")]
        worker_id: Uuid,
    },

    /// Shut the serving loop down.
    Shutdown,
}

/// Direct answers to operations.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Reply {
    Enqueued { entry: PipelineEntry },
    Entries { entries: Vec<EntryView> },
    Page(EntryPage),
    Removed { removed: bool },
    Count { count: usize },
    Reordered { reordered: bool },
    State { paused: bool },
    Jobs { jobs: Vec<WorkerSummary> },
    Job { record: Option<WorkerRecord> },
    Ack,
    Error { message: String },
}

/// Status updates published by the core.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A worker process was created.
    #[serde(rename_all = "camelCase")]
    WorkerStarted {
        #[ts(type = "string")]
        worker_id: Uuid,
        command: String,
        tag: Option<String>,
    },

    /// A worker produced output.
    #[serde(rename_all = "camelCase")]
    WorkerLogChunk {
        #[ts(type = "string")]
        worker_id: Uuid,
        content: String,
    },

    /// A worker reached a terminal state.
    #[serde(rename_all = "camelCase")]
    WorkerFinished {
        #[ts(type = "string")]
        worker_id: Uuid,
        status: WorkerStatus,
    },

    /// A queue entry changed state or result fields.
    EntryUpdated { entry: PipelineEntry },

    /// A queue entry was removed.
    #[serde(rename_all = "camelCase")]
    EntryRemoved {
        #[ts(type = "string")]
        entry_id: Uuid,
    },

    /// The queue as a whole changed (pause flag, length).
    QueueChanged { paused: bool, length: usize },
}
