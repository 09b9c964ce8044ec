//! Input resolution for queue entries.
//!
//! Stages that consume a processed artifact do not get the original upload:
//! they look for the upscaled (or background-removed) version next to it.
//! The places to look are listed declaratively here, in priority order, and
//! the first candidate that exists on disk wins.

use crate::artifacts::ArtifactRegistry;
use pq_protocol::queue_models::{PipelineEntry, Variant};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which processed artifact a candidate list looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Upscaled,
    NoBackground,
}

impl ArtifactKind {
    /// Suffix used for files named after the external record id.
    fn record_suffix(self) -> &'static str {
        match self {
            ArtifactKind::Upscaled => "_upscale",
            ArtifactKind::NoBackground => "_nobg",
        }
    }

    /// Suffixes appended to the upload's stem by older workers.
    fn legacy_suffixes(self) -> &'static [&'static str] {
        match self {
            ArtifactKind::Upscaled => &["_4096", "-4096", "_upscaled", "-upscaled"],
            ArtifactKind::NoBackground => &[
                "_4096_nobg",
                "-4096-nobg",
                "_upscaled_nobg",
                "-upscaled-nobg",
                "_4096_no_bg",
                "-4096-no_bg",
                "_4096-no-bg",
                "-4096-no-bg",
                "_upscaled_no_bg",
                "-upscaled-no_bg",
                "_upscaled-no-bg",
                "-upscaled-no-bg",
            ],
        }
    }
}

/// Candidate lists to walk for `variant`, in order.
pub fn preference(variant: Option<Variant>) -> &'static [ArtifactKind] {
    match variant {
        Some(Variant::Normal) => &[ArtifactKind::Upscaled],
        Some(Variant::Nobg) | None => &[ArtifactKind::NoBackground, ArtifactKind::Upscaled],
    }
}

/// Path of the original upload for `file`.
pub fn original_path(uploads_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        uploads_dir.join(path)
    }
}

/// Filesystem candidates for one artifact kind, highest priority first.
///
/// Candidates live next to an absolute upload, or in the uploads directory
/// for relative ones. They keep the upload's extension.
pub fn candidates(
    kind: ArtifactKind,
    uploads_dir: &Path,
    file: &str,
    record_id: Option<i64>,
) -> Vec<PathBuf> {
    let original = original_path(uploads_dir, file);
    let search_dir = if Path::new(file).is_absolute() {
        original.parent().unwrap_or(uploads_dir).to_path_buf()
    } else {
        uploads_dir.to_path_buf()
    };
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let by_record = record_id.map(|id| format!("{id}{}{ext}", kind.record_suffix()));
    let legacy = kind
        .legacy_suffixes()
        .iter()
        .map(|suffix| format!("{stem}{suffix}{ext}"));

    by_record
        .into_iter()
        .chain(legacy)
        .map(|name| search_dir.join(name))
        .collect()
}

/// Location remembered in the artifact registry for one artifact kind.
fn registered(kind: ArtifactKind, file: &str, registry: &dyn ArtifactRegistry) -> Option<PathBuf> {
    let record = registry.get(file)?;
    match kind {
        ArtifactKind::Upscaled => record.upscaled_path,
        ArtifactKind::NoBackground => record.nobg_path,
    }
}

/// First existing processed artifact of `kind`, if any.
pub fn find_artifact(
    kind: ArtifactKind,
    uploads_dir: &Path,
    entry: &PipelineEntry,
    registry: &dyn ArtifactRegistry,
) -> Option<PathBuf> {
    candidates(kind, uploads_dir, &entry.file, entry.record_id)
        .into_iter()
        .chain(registered(kind, &entry.file, registry))
        .find(|path| path.exists())
}

/// Input path for `entry`.
///
/// Stages working on the original upload get it directly. Other stages get
/// the first processed artifact found in variant preference order, falling
/// back to the original upload. The returned path is not guaranteed to
/// exist.
pub fn resolve_input(
    uploads_dir: &Path,
    entry: &PipelineEntry,
    registry: &dyn ArtifactRegistry,
) -> PathBuf {
    let original = original_path(uploads_dir, &entry.file);
    if !entry.stage.uses_processed_artifact() {
        return original;
    }

    for kind in preference(entry.variant) {
        if let Some(found) = find_artifact(*kind, uploads_dir, entry, registry) {
            debug!(entry_id = %entry.id, path = %found.display(), ?kind, "Resolved processed input");
            return found;
        }
    }

    debug!(entry_id = %entry.id, path = %original.display(), "No processed input, using upload");
    original
}
