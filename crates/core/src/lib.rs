//! # pq-core
//!
//! Worker supervision and queue scheduling for the pipeline job supervisor.
//!
//! This crate provides:
//! - Configuration loading from the `.pipeline-queue/` directory
//! - A process supervisor for external worker programs, with a persisted
//!   history ledger
//! - The pipeline queue: ordered, persisted, one worker at a time
//! - The artifact registry later stages read their inputs from
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and management
//! - [`worker`]: Worker processes, supervisor and history ledger
//! - [`queue`]: Pipeline queue, input resolution and result extraction
//! - [`artifacts`]: Artifact registry
//! - [`events`]: Optional event publishing
//! - [`init`]: Project initialization
//! - [`store`]: Whole-document JSON persistence

pub mod artifacts;
pub mod config;
pub mod events;
pub mod init;
pub mod queue;
pub mod store;
pub mod worker;
