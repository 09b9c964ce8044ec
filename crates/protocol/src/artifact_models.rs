//! Long-lived artifact records.
//!
//! An artifact record remembers what earlier stages produced for one
//! original upload, so later stages can find their inputs again.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ts_rs::TS;

/// Everything known about one original upload.
///
/// Records are keyed by the queue entry's `file` string.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// External database key.
    #[ts(type = "number | null")]
    #[serde(default)]
    pub record_id: Option<i64>,

    /// Where the upscaled version was last found.
    #[ts(type = "string | null")]
    #[serde(default)]
    pub upscaled_path: Option<PathBuf>,

    /// Where the background-removed version was last found.
    #[ts(type = "string | null")]
    #[serde(default)]
    pub nobg_path: Option<PathBuf>,

    /// URL of the published listing.
    #[serde(default)]
    pub listing_url: Option<String>,

    /// Title last written to the listing.
    #[serde(default)]
    pub title: Option<String>,

    /// Free-text status label, e.g. `Submitted` or
    /// `Listed (Listing URL: https://...)`.
    #[serde(default)]
    pub status: Option<String>,
}
