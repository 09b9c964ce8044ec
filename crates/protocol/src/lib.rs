//! # pq-protocol
//!
//! Core protocol definitions and data models for the pipeline job supervisor.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (TOML supervisor config)
//! - Worker process state and the persisted history ledger
//! - Queue entries and the persisted queue document
//! - Communication between callers and the core
//!
//! ## Modules
//!
//! - [`artifact_models`]: Long-lived artifact records
//! - [`config_models`]: Supervisor configuration from config.toml
//! - [`queue_models`]: Queue entries, stage types and statuses
//! - [`worker_models`]: Worker process state and history records
//! - [`ipc`]: Operations, replies and events
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, chrono and uuid
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other workspace crates

pub mod artifact_models;
pub mod config_models;
pub mod ipc;
pub mod queue_models;
pub mod worker_models;

// Re-export all public types for convenience
pub use artifact_models::*;
pub use config_models::*;
pub use ipc::*;
pub use queue_models::*;
pub use worker_models::*;
