//! File generation for `.pipeline-queue/` initialization.

use super::error::{InitError, InitResult};
use super::templates::get_template;
use crate::config::loader::CONFIG_DIR;
use crate::config::models::CONFIG_FILE;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Options for initializing a project.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Project root where `.pipeline-queue/` will be created.
    pub target_dir: PathBuf,

    /// Overwrite an existing config.toml.
    pub force: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            target_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            force: false,
        }
    }
}

/// Write the starter configuration for a project.
///
/// Creates the following structure and returns the path of config.toml:
/// ```text
/// .pipeline-queue/
/// ├── config.toml
/// └── state/
/// ```
///
/// # Errors
///
/// Fails if config.toml already exists (without `force`), or on I/O errors.
///
/// # Example
/// ```no_run
/// use pq_core::init::{init_project, InitOptions};
/// use std::path::PathBuf;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = InitOptions {
///     target_dir: PathBuf::from("."),
///     force: false,
/// };
///
/// let config_path = init_project(options).await?;
/// println!("Wrote {}", config_path.display());
/// # Ok(())
/// # }
/// ```
pub async fn init_project(options: InitOptions) -> InitResult<PathBuf> {
    let config_dir = options.target_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    if config_path.exists() && !options.force {
        return Err(InitError::AlreadyInitialized(config_path));
    }

    create_dir(&config_dir.join("state")).await?;
    write_template_file(&config_dir, CONFIG_FILE).await?;

    info!(path = %config_path.display(), "Initialized pipeline queue project");
    Ok(config_path)
}

async fn create_dir(path: &Path) -> InitResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| InitError::DirectoryCreate {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_template_file(dir: &Path, template_path: &str) -> InitResult<()> {
    let content = get_template(template_path)
        .ok_or_else(|| InitError::TemplateNotFound(template_path.to_string()))?;

    let target_path = dir.join(template_path);
    fs::write(&target_path, content)
        .await
        .map_err(|source| InitError::FileWrite {
            path: target_path,
            source,
        })
}
