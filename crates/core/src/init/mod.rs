//! Project initialization.
//!
//! Creates `.pipeline-queue/config.toml` from the embedded template so a new
//! project starts from a documented configuration.

pub mod error;
pub mod generator;
pub mod templates;

pub use error::{InitError, InitResult};
pub use generator::{init_project, InitOptions};
pub use templates::{get_template, list_templates};
