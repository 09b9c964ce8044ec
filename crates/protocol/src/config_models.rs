//! Supervisor configuration models for `.pipeline-queue/config.toml`.
//!
//! This module defines the structure of the configuration file that tells
//! the supervisor where uploads and state live and which external worker
//! handles each stage.

use serde::Deserialize;
use serde::Serialize;
use std::path::PathBuf;
use ts_rs::TS;

use crate::queue_models::StageType;

/// Represents settings from `.pipeline-queue/config.toml`.
///
/// Relative paths are resolved against the project root by the loader.
///
/// # Example
///
/// ```toml
/// # .pipeline-queue/config.toml
/// uploads_dir = "uploads"
/// state_dir = ".pipeline-queue/state"
/// color_helper = "scripts/detect_colors.sh"
///
/// [workers]
/// upscale = "scripts/upscale.sh"
/// submit = "workers/submit/run.sh"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct SupervisorConfig {
    /// Directory holding original uploads and derived artifacts.
    #[serde(default = "default_uploads_dir")]
    #[ts(type = "string")]
    pub uploads_dir: PathBuf,

    /// Directory holding `queue.json`, `history.json` and `artifacts.json`.
    #[serde(default = "default_state_dir")]
    #[ts(type = "string")]
    pub state_dir: PathBuf,

    /// Helper printing up to three comma-separated dominant colors of the
    /// file given as its only argument.
    #[serde(default)]
    #[ts(type = "string | null")]
    pub color_helper: Option<PathBuf>,

    /// Upper bound on one color helper invocation.
    #[serde(default = "default_color_helper_timeout_secs")]
    pub color_helper_timeout_secs: u64,

    /// Time a stopped worker gets between SIGTERM and SIGKILL.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// External worker executable per stage.
    #[serde(default)]
    pub workers: WorkersConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            state_dir: default_state_dir(),
            color_helper: None,
            color_helper_timeout_secs: default_color_helper_timeout_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            workers: WorkersConfig::default(),
        }
    }
}

/// External worker executables, one per stage type.
///
/// A stage without a configured worker cannot run; its entries end in the
/// `error` state.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
pub struct WorkersConfig {
    #[serde(default)]
    #[ts(type = "string | null")]
    pub upscale: Option<PathBuf>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub submit: Option<PathBuf>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub price_fix: Option<PathBuf>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub title_fix: Option<PathBuf>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub mockup_fix: Option<PathBuf>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub finalize: Option<PathBuf>,
}

impl WorkersConfig {
    /// The executable configured for `stage`.
    pub fn for_stage(&self, stage: StageType) -> Option<&PathBuf> {
        match stage {
            StageType::Upscale => self.upscale.as_ref(),
            StageType::Submit => self.submit.as_ref(),
            StageType::PriceFix => self.price_fix.as_ref(),
            StageType::TitleFix => self.title_fix.as_ref(),
            StageType::MockupFix => self.mockup_fix.as_ref(),
            StageType::Finalize => self.finalize.as_ref(),
        }
    }

    /// Mutable access to the slot for `stage`.
    pub fn slot_mut(&mut self, stage: StageType) -> &mut Option<PathBuf> {
        match stage {
            StageType::Upscale => &mut self.upscale,
            StageType::Submit => &mut self.submit,
            StageType::PriceFix => &mut self.price_fix,
            StageType::TitleFix => &mut self.title_fix,
            StageType::MockupFix => &mut self.mockup_fix,
            StageType::Finalize => &mut self.finalize,
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".pipeline-queue/state")
}

fn default_color_helper_timeout_secs() -> u64 {
    30
}

fn default_stop_grace_secs() -> u64 {
    5
}
