//! Configuration loading and management.
//!
//! This module loads `.pipeline-queue/config.toml` and resolves the paths it
//! contains against the project root.

pub mod error;
pub mod loader;
pub mod models;
