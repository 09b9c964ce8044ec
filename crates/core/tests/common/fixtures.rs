//! Test fixtures: temporary projects with scripted workers.

use pq_core::artifacts::JsonArtifactRegistry;
use pq_core::config::models::AppConfig;
use pq_core::events::EventSink;
use pq_core::queue::{ColorDetector, PipelineQueue, QueueStore};
use pq_core::worker::{HistoryLedger, ProcessSupervisor, SupervisorOptions};
use pq_protocol::ipc::Event;
use pq_protocol::queue_models::StageType;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// A temporary project root with `uploads/`, `bin/` and a state directory.
///
/// The `TempDir` must be kept alive for the test duration.
pub struct TestProject {
    pub dir: TempDir,
    pub config: AppConfig,
}

#[allow(dead_code)]
impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = AppConfig::with_root(dir.path());
        std::fs::create_dir_all(&config.supervisor.uploads_dir).expect("uploads dir");
        std::fs::create_dir_all(dir.path().join("bin")).expect("bin dir");
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn uploads(&self) -> &Path {
        &self.config.supervisor.uploads_dir
    }

    /// Create a file in the uploads directory.
    pub fn upload(&self, name: &str) -> PathBuf {
        let path = self.uploads().join(name);
        std::fs::write(&path, b"image").expect("write upload");
        path
    }

    /// Install `body` as the worker for `stage`.
    pub fn worker(&mut self, stage: StageType, body: &str) -> PathBuf {
        let path = write_script(&self.root().join("bin"), &format!("{stage}.sh"), body);
        *self.config.supervisor.workers.slot_mut(stage) = Some(path.clone());
        path
    }

    /// Install `body` as the color helper.
    pub fn color_helper(&mut self, body: &str) -> PathBuf {
        let path = write_script(&self.root().join("bin"), "colors.sh", body);
        self.config.supervisor.color_helper = Some(path.clone());
        path
    }

    pub async fn open_queue(&self) -> PipelineQueue {
        self.open_with(EventSink::disabled(), None).await
    }

    pub async fn open_queue_with_events(&self) -> (PipelineQueue, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(1024);
        (self.open_with(EventSink::new(tx), None).await, rx)
    }

    pub async fn open_queue_with_colors(&self, colors: Arc<dyn ColorDetector>) -> PipelineQueue {
        self.open_with(EventSink::disabled(), Some(colors)).await
    }

    async fn open_with(
        &self,
        events: EventSink,
        colors: Option<Arc<dyn ColorDetector>>,
    ) -> PipelineQueue {
        let supervisor = ProcessSupervisor::new(HistoryLedger::load(self.config.history_path()))
            .with_options(SupervisorOptions {
                stop_grace: Duration::from_millis(500),
                drain_timeout: Duration::from_millis(500),
            })
            .with_events(events.clone());
        let registry = JsonArtifactRegistry::load(self.config.artifacts_path());

        let mut builder = PipelineQueue::builder(
            self.config.supervisor.clone(),
            Arc::new(supervisor),
            Arc::new(registry),
        )
        .store(QueueStore::at(self.config.queue_path()))
        .events(events);
        if let Some(colors) = colors {
            builder = builder.colors(colors);
        }
        builder.open().await
    }
}

/// Write an executable `/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}
