//! Embedded template files for project initialization.
//!
//! The workspace `templates/` directory is embedded at compile time so the
//! CLI can write a starter configuration without external files.

use rust_embed::RustEmbed;

/// Embedded template files from the workspace `templates/` directory.
///
/// With the `debug-embed` feature the files are embedded in debug builds
/// as well, so tests see exactly what a release binary ships.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../templates"]
pub struct TemplateAssets;

/// Get template file content by path, relative to the templates root.
///
/// # Example
/// ```
/// use pq_core::init::templates::get_template;
///
/// let config = get_template("config.toml").expect("config.toml should exist");
/// assert!(config.contains("uploads_dir"));
/// ```
pub fn get_template(path: &str) -> Option<String> {
    TemplateAssets::get(path).map(|file| String::from_utf8_lossy(file.data.as_ref()).to_string())
}

/// List all template files whose path starts with `prefix`.
pub fn list_templates(prefix: &str) -> Vec<String> {
    TemplateAssets::iter()
        .filter(|path| path.starts_with(prefix))
        .map(|path| path.to_string())
        .collect()
}
