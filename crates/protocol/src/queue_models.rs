//! Pipeline queue models.
//!
//! This module defines the entries held by the pipeline queue, the stage
//! types they request, and the document persisted to the queue file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::worker_models::WorkerStatus;

/// The kind of processing a queue entry requests.
///
/// Each stage maps to one external worker executable with a fixed
/// positional-argument contract.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "camelCase")]
pub enum StageType {
    /// Upscale the original upload.
    Upscale,
    /// Submit the processed artifact to the external listing service.
    Submit,
    /// Update the price of a published listing.
    PriceFix,
    /// Rewrite the title of a published listing.
    TitleFix,
    /// Regenerate the mockups of a published listing.
    MockupFix,
    /// Finalize a published listing.
    Finalize,
}

impl StageType {
    pub const ALL: [StageType; 6] = [
        StageType::Upscale,
        StageType::Submit,
        StageType::PriceFix,
        StageType::TitleFix,
        StageType::MockupFix,
        StageType::Finalize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageType::Upscale => "upscale",
            StageType::Submit => "submit",
            StageType::PriceFix => "price-fix",
            StageType::TitleFix => "title-fix",
            StageType::MockupFix => "mockup-fix",
            StageType::Finalize => "finalize",
        }
    }

    /// Whether this stage consumes an already-processed artifact rather than
    /// the original upload.
    pub fn uses_processed_artifact(self) -> bool {
        !matches!(self, StageType::Upscale)
    }

    /// Whether this stage operates on a published listing and therefore needs
    /// a listing reference.
    pub fn needs_listing(self) -> bool {
        matches!(
            self,
            StageType::PriceFix | StageType::TitleFix | StageType::MockupFix | StageType::Finalize
        )
    }

    /// Where the worker for this stage does its work.
    pub fn site(self) -> ExecutionSite {
        match self {
            StageType::MockupFix | StageType::Finalize => ExecutionSite::Remote,
            _ => ExecutionSite::Local,
        }
    }

    /// Label written to the artifact record once this stage has run.
    pub fn status_label(self) -> &'static str {
        match self {
            StageType::Upscale => "Upscaled",
            StageType::Submit => "Submitted",
            StageType::PriceFix => "Price Updated",
            StageType::TitleFix => "Title Fixed",
            StageType::MockupFix => "Mockups Fixed",
            StageType::Finalize => "Finalized",
        }
    }
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        StageType::ALL
            .into_iter()
            .find(|stage| {
                stage.as_str() == normalized || stage.as_str().replace('-', "") == normalized
            })
            .ok_or_else(|| format!("unknown stage type: {s}"))
    }
}

/// Where a stage's worker executes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSite {
    /// Works on local files.
    Local,
    /// Drives a remote session against the published listing.
    Remote,
}

impl ExecutionSite {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionSite::Local => "local",
            ExecutionSite::Remote => "remote",
        }
    }
}

/// Sub-selector for which processed artifact a stage should consume.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// The plain upscaled artifact.
    Normal,
    /// The background-removed artifact.
    Nobg,
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Variant::Normal),
            "nobg" | "no-bg" | "no_bg" => Ok(Variant::Nobg),
            other => Err(format!("unknown variant: {other}")),
        }
    }
}

/// Lifecycle status of a queue entry.
///
/// `Queued -> Running -> {Finished | Failed | Error | Stopped}`; failed and
/// errored entries may be reset to `Queued` by an explicit retry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Queued,
    Running,
    Finished,
    Failed,
    Error,
    Stopped,
}

impl EntryStatus {
    /// Whether the entry has reached an end state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, EntryStatus::Queued | EntryStatus::Running)
    }

    /// Whether an explicit retry may requeue the entry.
    pub fn is_retryable(self) -> bool {
        matches!(self, EntryStatus::Failed | EntryStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Queued => "queued",
            EntryStatus::Running => "running",
            EntryStatus::Finished => "finished",
            EntryStatus::Failed => "failed",
            EntryStatus::Error => "error",
            EntryStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<WorkerStatus> for EntryStatus {
    fn from(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Running => EntryStatus::Running,
            WorkerStatus::Finished => EntryStatus::Finished,
            WorkerStatus::Failed => EntryStatus::Failed,
            WorkerStatus::Error => EntryStatus::Error,
            WorkerStatus::Stopped => EntryStatus::Stopped,
        }
    }
}

/// One logical unit of queued work: an artifact plus the stage to run on it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEntry {
    #[ts(type = "string")]
    pub id: Uuid,

    /// Artifact identifier: a filename inside the uploads directory or an
    /// absolute path.
    pub file: String,

    pub stage: StageType,

    pub status: EntryStatus,

    /// Worker executing (or last executing) this entry. Lookup only.
    #[ts(type = "string | null")]
    #[serde(default)]
    pub worker_id: Option<Uuid>,

    #[serde(default)]
    pub result_path: Option<String>,

    #[serde(default)]
    pub product_url: Option<String>,

    /// External database key of the artifact.
    #[ts(type = "number | null")]
    #[serde(default)]
    pub record_id: Option<i64>,

    #[serde(default)]
    pub variant: Option<Variant>,

    #[ts(type = "string | null")]
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[ts(type = "string | null")]
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
}

impl PipelineEntry {
    /// Create a fresh queued entry.
    pub fn new(file: String, stage: StageType) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            stage,
            status: EntryStatus::Queued,
            worker_id: None,
            result_path: None,
            product_url: None,
            record_id: None,
            variant: None,
            start_time: None,
            finish_time: None,
        }
    }

    /// Key used to group entries that refer to the same artifact.
    pub fn group_key(&self) -> String {
        match self.record_id {
            Some(id) => format!("record:{id}"),
            None => format!("file:{}", self.file),
        }
    }
}

/// Parameters for adding an entry to the queue.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub file: String,
    pub stage: StageType,
    #[ts(type = "number | null")]
    #[serde(default)]
    pub record_id: Option<i64>,
    #[serde(default)]
    pub variant: Option<Variant>,
    /// Prepend instead of append.
    #[serde(default)]
    pub insert_at_front: bool,
}

impl EnqueueRequest {
    pub fn new(file: impl Into<String>, stage: StageType) -> Self {
        Self {
            file: file.into(),
            stage,
            record_id: None,
            variant: None,
            insert_at_front: false,
        }
    }

    pub fn with_record_id(mut self, record_id: i64) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn at_front(mut self) -> Self {
        self.insert_at_front = true;
        self
    }
}

/// Listing view of an entry, with the execution site filled in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: PipelineEntry,
    pub location: ExecutionSite,
}

/// One page of entries, grouped by artifact.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub entries: Vec<EntryView>,
    /// Number of distinct artifact groups across the whole queue.
    pub total_groups: usize,
}

/// The document persisted to the queue file.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub entries: Vec<PipelineEntry>,
    #[serde(default)]
    pub paused: bool,
}
