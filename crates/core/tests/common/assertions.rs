//! Polling helpers for asynchronous queue state.

use pq_core::queue::PipelineQueue;
use pq_protocol::ipc::Event;
use pq_protocol::queue_models::{EntryStatus, PipelineEntry};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// How long any single wait may take before the test fails.
pub const WAIT_LIMIT: Duration = Duration::from_secs(10);

/// Poll the queue until `predicate` holds for its entries.
pub async fn wait_until<F>(queue: &PipelineQueue, mut predicate: F) -> Vec<PipelineEntry>
where
    F: FnMut(&[PipelineEntry]) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let entries: Vec<PipelineEntry> = queue.list().await.into_iter().map(|v| v.entry).collect();
        if predicate(&entries) {
            return entries;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for queue state, last seen: {entries:#?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Wait for one entry to reach `status` and return it.
#[allow(dead_code)]
pub async fn wait_for_status(queue: &PipelineQueue, id: Uuid, status: EntryStatus) -> PipelineEntry {
    let entries = wait_until(queue, |entries| {
        entries.iter().any(|e| e.id == id && e.status == status)
    })
    .await;
    entries
        .into_iter()
        .find(|e| e.id == id)
        .expect("entry present")
}

/// Wait until no entry is queued or running.
#[allow(dead_code)]
pub async fn wait_for_idle(queue: &PipelineQueue) -> Vec<PipelineEntry> {
    wait_until(queue, |entries| entries.iter().all(|e| e.status.is_terminal())).await
}

/// Number of running entries.
#[allow(dead_code)]
pub fn running_count(entries: &[PipelineEntry]) -> usize {
    entries
        .iter()
        .filter(|e| e.status == EntryStatus::Running)
        .count()
}

/// Everything currently buffered in an event channel.
#[allow(dead_code)]
pub fn drain_events(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
