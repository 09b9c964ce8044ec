//! Worker supervision.
//!
//! - [`process`]: a single external process and its subscribers
//! - [`supervisor`]: launching, stopping and tracking workers
//! - [`history`]: persisted audit ledger of every worker

pub mod error;
pub mod history;
pub mod process;
pub mod supervisor;

pub use error::SupervisorError;
pub use history::HistoryLedger;
pub use process::{CompletionCallback, JobOptions, LogCallback, SubscriptionId, WorkerProcess};
pub use supervisor::{ProcessSupervisor, SupervisorOptions};
