//! Dominant color detection for submissions.
//!
//! The submit worker accepts up to three colors after the input path. They
//! come from an external helper; when the helper is missing, fails or times
//! out the submission simply goes ahead without colors.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Most colors passed to a submission.
pub const MAX_COLORS: usize = 3;

/// Source of dominant colors for an input file.
#[async_trait]
pub trait ColorDetector: Send + Sync {
    /// Up to [`MAX_COLORS`] color names. Never fails; problems yield an
    /// empty list.
    async fn detect(&self, input: &Path) -> Vec<String>;
}

/// Detector used when no helper is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoColors;

#[async_trait]
impl ColorDetector for NoColors {
    async fn detect(&self, _input: &Path) -> Vec<String> {
        Vec::new()
    }
}

/// Runs an external helper that prints comma-separated colors on stdout.
#[derive(Debug, Clone)]
pub struct HelperColorDetector {
    helper: PathBuf,
    timeout: Duration,
}

impl HelperColorDetector {
    pub fn new(helper: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            helper: helper.into(),
            timeout,
        }
    }

    async fn run(&self, input: &Path) -> Result<String, String> {
        let output = Command::new(&self.helper)
            .arg(input)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| format!("timed out after {:?}", self.timeout))?
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            return Err(format!("helper exited with {}", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ColorDetector for HelperColorDetector {
    async fn detect(&self, input: &Path) -> Vec<String> {
        match self.run(input).await {
            Ok(stdout) => {
                let colors = parse_colors(&stdout);
                debug!(input = %input.display(), ?colors, "Detected colors");
                colors
            }
            Err(reason) => {
                warn!(
                    helper = %self.helper.display(),
                    input = %input.display(),
                    reason = %reason,
                    "Color detection failed, submitting without colors"
                );
                Vec::new()
            }
        }
    }
}

/// Split helper output on commas, dropping blanks, keeping at most
/// [`MAX_COLORS`].
pub fn parse_colors(output: &str) -> Vec<String> {
    output
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|color| !color.is_empty())
        .take(MAX_COLORS)
        .map(ToString::to_string)
        .collect()
}
