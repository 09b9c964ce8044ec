//! Configuration file loader for the `.pipeline-queue/` directory.
//!
//! This module loads `.pipeline-queue/config.toml` and resolves every path
//! in it against the project root, so the rest of the crate never has to
//! care about the process working directory.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::{AppConfig, CONFIG_FILE};
use pq_protocol::config_models::SupervisorConfig;
use pq_protocol::queue_models::StageType;
use std::path::{Path, PathBuf};

/// Name of the configuration directory under the project root.
pub const CONFIG_DIR: &str = ".pipeline-queue";

/// Loads the supervisor configuration for the project at `root`.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.pipeline-queue/` folder
///
/// # Returns
///
/// An `AppConfig` with all paths resolved. If the directory or the config
/// file is missing, the defaults are returned rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - The config file exists but cannot be read
/// - The file has invalid TOML syntax
/// - A value is out of range (e.g. a zero helper timeout)
///
/// # Example
///
/// ```rust,no_run
/// use pq_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Uploads in {}", config.supervisor.uploads_dir.display());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(AppConfig::with_root(root));
    }

    let content =
        tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|source| ConfigError::FileRead {
                path: config_path.clone(),
                source,
            })?;

    let config: SupervisorConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.clone(),
            source,
        })?;

    validate(&config, &config_path)?;

    Ok(AppConfig {
        root: root.to_path_buf(),
        supervisor: resolve_paths(config, root),
    })
}

fn validate(config: &SupervisorConfig, path: &Path) -> ConfigResult<()> {
    if config.color_helper_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig {
            path: path.to_path_buf(),
            reason: "color_helper_timeout_secs must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Make every configured path absolute.
///
/// Data directories are joined onto `root`. Executables configured as bare
/// names (no path separator) are looked up on `PATH` first.
fn resolve_paths(mut config: SupervisorConfig, root: &Path) -> SupervisorConfig {
    config.uploads_dir = root.join(&config.uploads_dir);
    config.state_dir = root.join(&config.state_dir);
    config.color_helper = config
        .color_helper
        .map(|helper| resolve_executable(&helper, root));

    for stage in StageType::ALL {
        let slot = config.workers.slot_mut(stage);
        if let Some(executable) = slot.take() {
            *slot = Some(resolve_executable(&executable, root));
        }
    }

    config
}

/// Resolve an executable reference to a concrete path.
pub fn resolve_executable(executable: &Path, root: &Path) -> PathBuf {
    let is_bare_name = executable.components().count() == 1 && !executable.is_absolute();
    if is_bare_name {
        if let Ok(found) = which::which(executable) {
            return found;
        }
    }
    root.join(executable)
}
