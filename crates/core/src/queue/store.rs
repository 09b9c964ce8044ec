//! Queue persistence.

use crate::store;
use pq_protocol::queue_models::QueueSnapshot;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Where the queue document lives. `None` keeps the queue in memory only.
#[derive(Debug, Clone, Default)]
pub struct QueueStore {
    path: Option<PathBuf>,
}

impl QueueStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the persisted queue. Missing or unreadable documents load as an
    /// empty, unpaused queue.
    pub fn load(&self) -> QueueSnapshot {
        let Some(path) = &self.path else {
            return QueueSnapshot::default();
        };
        match store::read_json::<QueueSnapshot>(path) {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable queue file");
                QueueSnapshot::default()
            }
        }
    }

    /// Rewrite the queue document. Failures are logged; the in-memory queue
    /// stays authoritative.
    pub fn save(&self, snapshot: &QueueSnapshot) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = store::write_json(path, snapshot) {
            warn!(error = %e, "Failed to persist queue");
        }
    }
}
