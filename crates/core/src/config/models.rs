//! Resolved application configuration.
//!
//! `AppConfig` pairs the parsed `SupervisorConfig` with the project root it
//! was loaded from. After loading, every path in it is absolute or was found
//! on `PATH`.

use pq_protocol::config_models::SupervisorConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the configuration inside `.pipeline-queue/`.
pub const CONFIG_FILE: &str = "config.toml";

/// File name of the persisted queue document inside the state directory.
pub const QUEUE_FILE: &str = "queue.json";

/// File name of the worker history ledger inside the state directory.
pub const HISTORY_FILE: &str = "history.json";

/// File name of the artifact registry inside the state directory.
pub const ARTIFACTS_FILE: &str = "artifacts.json";

/// Unified application configuration loaded from `.pipeline-queue/`.
///
/// # Example
///
/// ```rust,no_run
/// use pq_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Queue persisted at {}", config.queue_path().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory containing `.pipeline-queue/`.
    pub root: PathBuf,

    /// Supervisor settings with paths already resolved.
    pub supervisor: SupervisorConfig,
}

impl AppConfig {
    /// Default configuration rooted at `root`, with paths resolved.
    pub fn with_root(root: &Path) -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            root: root.to_path_buf(),
            supervisor: SupervisorConfig {
                uploads_dir: root.join(&defaults.uploads_dir),
                state_dir: root.join(&defaults.state_dir),
                ..defaults
            },
        }
    }

    pub fn queue_path(&self) -> PathBuf {
        self.supervisor.state_dir.join(QUEUE_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.supervisor.state_dir.join(HISTORY_FILE)
    }

    pub fn artifacts_path(&self) -> PathBuf {
        self.supervisor.state_dir.join(ARTIFACTS_FILE)
    }

    pub fn color_helper_timeout(&self) -> Duration {
        Duration::from_secs(self.supervisor.color_helper_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.supervisor.stop_grace_secs)
    }
}
