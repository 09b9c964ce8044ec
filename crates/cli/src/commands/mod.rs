//! Subcommand handlers.

pub mod history;
pub mod init;
pub mod queue;
pub mod serve;
