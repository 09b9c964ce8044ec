//! Turning a queue entry into a worker launch.
//!
//! Each stage has a fixed positional-argument contract with its worker:
//!
//! | stage      | arguments                            |
//! |------------|--------------------------------------|
//! | upscale    | `input`                              |
//! | submit     | `input [color1 [color2 [color3]]]`   |
//! | price-fix  | `listing_url`                        |
//! | title-fix  | `listing_id input`                   |
//! | mockup-fix | `FixMockups listing_url`             |
//! | finalize   | `Finalize listing_url`               |

use crate::artifacts::ArtifactRegistry;
use crate::queue::colors::ColorDetector;
use crate::queue::error::DispatchError;
use crate::queue::extract;
use crate::queue::resolve;
use pq_protocol::config_models::SupervisorConfig;
use pq_protocol::queue_models::{EntryStatus, PipelineEntry, StageType};
use std::path::{Path, PathBuf};

/// Everything needed to start the worker for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// The executable's own directory.
    pub working_directory: PathBuf,
    /// Listing reference the entry was resolved against, if any.
    pub listing_url: Option<String>,
}

/// Listing reference for `entry`: its own value, then the artifact record's
/// listing URL, then a URL embedded in the record's status label.
pub fn resolve_listing(entry: &PipelineEntry, registry: &dyn ArtifactRegistry) -> Option<String> {
    if let Some(url) = entry.product_url.as_ref().filter(|u| !u.is_empty()) {
        return Some(url.clone());
    }
    let record = registry.get(&entry.file)?;
    record
        .listing_url
        .filter(|u| !u.is_empty())
        .or_else(|| record.status.as_deref().and_then(extract::listing_url_from_status))
}

/// Positional arguments for `stage`.
pub fn build_args(
    stage: StageType,
    input: &Path,
    listing_url: Option<&str>,
    colors: Vec<String>,
) -> Vec<String> {
    let input = input.to_string_lossy().into_owned();
    let url = listing_url.unwrap_or_default().to_string();
    match stage {
        StageType::Upscale => vec![input],
        StageType::Submit => std::iter::once(input).chain(colors).collect(),
        StageType::PriceFix => vec![url],
        StageType::TitleFix => vec![extract::listing_id(&url), input],
        StageType::MockupFix => vec!["FixMockups".to_string(), url],
        StageType::Finalize => vec!["Finalize".to_string(), url],
    }
}

/// Artifact status label written after a run of `stage` ended in `status`.
///
/// Stopped runs leave the label untouched.
pub fn status_label(stage: StageType, status: EntryStatus) -> Option<String> {
    match status {
        EntryStatus::Finished => Some(stage.status_label().to_string()),
        EntryStatus::Failed | EntryStatus::Error => Some(format!("{} failed", stage.status_label())),
        EntryStatus::Queued | EntryStatus::Running | EntryStatus::Stopped => None,
    }
}

/// Work out how to launch `entry`.
///
/// Colors are only requested for submissions, after the input is known to
/// exist.
pub async fn plan(
    entry: &PipelineEntry,
    config: &SupervisorConfig,
    registry: &dyn ArtifactRegistry,
    colors: &dyn ColorDetector,
) -> Result<LaunchPlan, DispatchError> {
    let executable = config
        .workers
        .for_stage(entry.stage)
        .ok_or(DispatchError::NoWorker(entry.stage))?
        .clone();

    let input = resolve::resolve_input(&config.uploads_dir, entry, registry);
    if !input.exists() {
        return Err(DispatchError::InputMissing(input));
    }
    if !executable.exists() {
        return Err(DispatchError::WorkerMissing(executable));
    }

    let listing_url = if entry.stage.needs_listing() {
        Some(
            resolve_listing(entry, registry)
                .ok_or_else(|| DispatchError::ListingUnresolved(entry.file.clone()))?,
        )
    } else {
        None
    };

    let detected = if entry.stage == StageType::Submit {
        colors.detect(&input).await
    } else {
        Vec::new()
    };

    let working_directory = executable
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.uploads_dir.clone());

    Ok(LaunchPlan {
        args: build_args(entry.stage, &input, listing_url.as_deref(), detected),
        executable,
        working_directory,
        listing_url,
    })
}
