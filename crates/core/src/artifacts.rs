//! Artifact registry.
//!
//! The registry is the queue's view of the wider application database: it
//! maps an artifact key (the queue entry's `file`) to what earlier stages
//! produced for it. The queue reads it to find processed inputs and listing
//! references, and writes back result paths, listing URLs, titles and status
//! labels after each stage.

use crate::store;
use parking_lot::Mutex;
use pq_protocol::artifact_models::ArtifactRecord;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Storage for artifact records, keyed by artifact key.
pub trait ArtifactRegistry: Send + Sync {
    /// The record for `key`, if one exists.
    fn get(&self, key: &str) -> Option<ArtifactRecord>;

    /// Apply `change` to the record for `key`, creating it when missing.
    fn update(&self, key: &str, change: &mut dyn FnMut(&mut ArtifactRecord));

    fn record_id(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|record| record.record_id)
    }
}

/// Registry persisted as a single JSON object in `artifacts.json`.
pub struct JsonArtifactRegistry {
    path: Option<PathBuf>,
    records: Mutex<BTreeMap<String, ArtifactRecord>>,
}

impl JsonArtifactRegistry {
    /// Registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load the registry stored at `path`. An unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match store::read_json::<BTreeMap<String, ArtifactRecord>>(&path) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable artifact registry");
                BTreeMap::new()
            }
        };
        debug!(path = %path.display(), records = records.len(), "Loaded artifact registry");

        Self {
            path: Some(path),
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert or replace the whole record for `key`.
    pub fn insert(&self, key: impl Into<String>, record: ArtifactRecord) {
        let mut records = self.records.lock();
        records.insert(key.into(), record);
        self.save(&records);
    }

    fn save(&self, records: &BTreeMap<String, ArtifactRecord>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = store::write_json(path, records) {
            warn!(error = %e, "Failed to persist artifact registry");
        }
    }
}

impl ArtifactRegistry for JsonArtifactRegistry {
    fn get(&self, key: &str) -> Option<ArtifactRecord> {
        self.records.lock().get(key).cloned()
    }

    fn update(&self, key: &str, change: &mut dyn FnMut(&mut ArtifactRecord)) {
        let mut records = self.records.lock();
        change(records.entry(key.to_string()).or_default());
        self.save(&records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_update_creates_missing_record() {
        let registry = JsonArtifactRegistry::in_memory();
        registry.update("cat.png", &mut |record| {
            record.listing_url = Some("https://shop.example/listings/42".to_string());
        });

        let record = registry.get("cat.png").unwrap();
        assert_eq!(
            record.listing_url.as_deref(),
            Some("https://shop.example/listings/42")
        );
        assert!(record.record_id.is_none());
    }

    #[test]
    fn test_record_id_lookup() {
        let registry = JsonArtifactRegistry::in_memory();
        registry.insert(
            "cat.png",
            ArtifactRecord {
                record_id: Some(17),
                ..Default::default()
            },
        );

        assert_eq!(registry.record_id("cat.png"), Some(17));
        assert_eq!(registry.record_id("dog.png"), None);
    }

    #[test]
    fn test_registry_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifacts.json");
        {
            let registry = JsonArtifactRegistry::load(&path);
            registry.update("cat.png", &mut |record| {
                record.title = Some("Sleepy Cat".to_string());
                record.status = Some("Title Fixed".to_string());
            });
        }

        let reloaded = JsonArtifactRegistry::load(&path);
        let record = reloaded.get("cat.png").unwrap();
        assert_eq!(record.title.as_deref(), Some("Sleepy Cat"));
        assert_eq!(record.status.as_deref(), Some("Title Fixed"));
    }
}
