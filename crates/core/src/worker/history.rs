//! Persisted ledger of every worker the supervisor has created.
//!
//! The ledger is audit data only: it lets callers read back what ran, with
//! which arguments and how it ended, after the supervisor restarts. Nothing
//! in it is ever resumed.

use crate::store;
use parking_lot::Mutex;
use pq_protocol::worker_models::{WorkerRecord, WorkerSummary};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Append-only list of worker records, rewritten in full on every change.
pub struct HistoryLedger {
    path: Option<PathBuf>,
    records: Mutex<Vec<WorkerRecord>>,
}

impl HistoryLedger {
    /// Ledger that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Load the ledger stored at `path`.
    ///
    /// A missing or unreadable file starts an empty ledger; the problem is
    /// logged and the next write replaces the file.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match store::read_json::<Vec<WorkerRecord>>(&path) {
            Ok(Some(records)) => records,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable worker history");
                Vec::new()
            }
        };
        debug!(path = %path.display(), records = records.len(), "Loaded worker history");

        Self {
            path: Some(path),
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert `record`, or replace the record with the same id, and persist.
    pub fn upsert(&self, record: &WorkerRecord) {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.save(&records);
    }

    pub fn list(&self) -> Vec<WorkerSummary> {
        self.records.lock().iter().map(WorkerRecord::summary).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<WorkerRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn save(&self, records: &[WorkerRecord]) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = store::write_json(path, records) {
            warn!(error = %e, "Failed to persist worker history");
        }
    }
}
