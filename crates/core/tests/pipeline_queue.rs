//! Integration tests for PipelineQueue.
//!
//! These tests run real `/bin/sh` workers and verify that the queue:
//! - Runs at most one entry at a time, in order
//! - Survives restarts with running entries put back in the queue
//! - Keeps going past entries that cannot run
//! - Extracts results from worker logs into entries and the artifact registry

#![cfg(unix)]

mod common;

use async_trait::async_trait;
use common::*;
use pq_core::artifacts::ArtifactRegistry;
use pq_core::queue::ColorDetector;
use pq_protocol::ipc::Event;
use pq_protocol::queue_models::{
    EnqueueRequest, EntryStatus, PipelineEntry, QueueSnapshot, StageType, Variant,
};
use pq_protocol::worker_models::WorkerStatus;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const UPSCALER: &str = r#"out="${1%.*}_4096.png"
cp "$1" "$out"
echo "Provisional output saved to: /tmp/ignored.png"
echo "Final output saved to: $out""#;

#[tokio::test]
async fn test_upscale_records_result_everywhere() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    project.worker(StageType::Upscale, UPSCALER);
    let queue = project.open_queue().await;

    let entry = queue
        .enqueue(EnqueueRequest::new("cat.png", StageType::Upscale).with_record_id(4))
        .await;
    let done = wait_for_status(&queue, entry.id, EntryStatus::Finished).await;

    let expected = project.uploads().join("cat_4096.png");
    assert_eq!(
        done.result_path.as_deref(),
        Some(expected.to_string_lossy().as_ref())
    );
    assert!(done.finish_time.is_some());

    let artifact = queue.registry().get("cat.png").unwrap();
    assert_eq!(artifact.upscaled_path.as_deref(), Some(expected.as_path()));
    assert_eq!(artifact.status.as_deref(), Some("Upscaled"));
    assert_eq!(artifact.record_id, Some(4));

    let worker = queue
        .supervisor()
        .job_record(done.worker_id.unwrap())
        .unwrap();
    assert_eq!(worker.status, WorkerStatus::Finished);
    assert_eq!(worker.tag.as_deref(), Some("cat.png"));
    assert_eq!(worker.working_directory, Some(project.root().join("bin")));
    assert_eq!(
        worker.result_path.as_deref(),
        Some(expected.to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn test_at_most_one_entry_runs() {
    let mut project = TestProject::new();
    for name in ["a.png", "b.png", "c.png"] {
        project.upload(name);
    }
    project.worker(StageType::Upscale, "sleep 0.2; echo done");
    let queue = project.open_queue().await;

    let mut ids = Vec::new();
    for name in ["a.png", "b.png", "c.png"] {
        ids.push(
            queue
                .enqueue(EnqueueRequest::new(name, StageType::Upscale))
                .await
                .id,
        );
    }

    let mut max_running = 0;
    let entries = wait_until(&queue, |entries| {
        max_running = max_running.max(running_count(entries));
        entries.iter().all(|e| e.status == EntryStatus::Finished)
    })
    .await;

    assert_eq!(max_running, 1);
    let finished: Vec<_> = entries.iter().map(|e| e.id).collect();
    assert_eq!(finished, ids);

    // Runs happened strictly one after another, in order.
    for pair in entries.windows(2) {
        assert!(pair[0].finish_time.unwrap() <= pair[1].start_time.unwrap());
    }
}

#[tokio::test]
async fn test_restart_requeues_running_entries() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    project.worker(StageType::Upscale, "echo ok");

    let mut interrupted = PipelineEntry::new("cat.png".to_string(), StageType::Upscale);
    interrupted.status = EntryStatus::Running;
    interrupted.worker_id = Some(uuid::Uuid::new_v4());
    let mut finished = PipelineEntry::new("old.png".to_string(), StageType::Upscale);
    finished.status = EntryStatus::Finished;
    let snapshot = QueueSnapshot {
        entries: vec![interrupted.clone(), finished.clone()],
        paused: true,
    };
    std::fs::create_dir_all(&project.config.supervisor.state_dir).unwrap();
    std::fs::write(
        project.config.queue_path(),
        serde_json::to_string(&snapshot).unwrap(),
    )
    .unwrap();

    let queue = project.open_queue().await;
    assert!(queue.is_paused().await);
    let entries = queue.snapshot().await.entries;
    assert_eq!(entries[0].status, EntryStatus::Queued);
    assert!(entries[0].worker_id.is_none());
    assert_eq!(entries[1].status, EntryStatus::Finished);

    // The coerced state is what the file now holds.
    let on_disk: QueueSnapshot =
        serde_json::from_str(&std::fs::read_to_string(project.config.queue_path()).unwrap())
            .unwrap();
    assert_eq!(on_disk.entries[0].status, EntryStatus::Queued);

    queue.resume().await;
    wait_for_status(&queue, interrupted.id, EntryStatus::Finished).await;
}

#[tokio::test]
async fn test_shutdown_keeps_in_flight_entry_queued() {
    let mut project = TestProject::new();
    project.upload("a.png");
    project.upload("b.png");
    let spawned = project.root().join("spawned.txt");
    project.worker(
        StageType::Upscale,
        &format!("echo \"$1\" >> '{}'\nsleep 30", spawned.display()),
    );
    let queue = project.open_queue().await;

    let a = queue
        .enqueue(EnqueueRequest::new("a.png", StageType::Upscale))
        .await;
    let b = queue
        .enqueue(EnqueueRequest::new("b.png", StageType::Upscale))
        .await;
    let running = wait_for_status(&queue, a.id, EntryStatus::Running).await;

    let stopped = queue.shutdown().await;
    assert_eq!(stopped, vec![running.worker_id.unwrap()]);
    tokio::time::timeout(
        Duration::from_secs(5),
        queue.supervisor().wait_exited(stopped[0]),
    )
    .await
    .unwrap()
    .unwrap();
    // Give the stop completion time to come back through the queue.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let on_disk: QueueSnapshot =
        serde_json::from_str(&std::fs::read_to_string(project.config.queue_path()).unwrap())
            .unwrap();
    assert!(!on_disk.paused);
    for entry in &on_disk.entries {
        assert_eq!(entry.status, EntryStatus::Queued, "{}", entry.file);
        assert!(entry.worker_id.is_none());
    }
    assert_eq!(queue.supervisor().list_jobs().len(), 1);
    let launched = std::fs::read_to_string(&spawned).unwrap_or_default();
    assert!(!launched.contains("b.png"), "b.png started during shutdown");

    // The next process picks the interrupted entry up again.
    let reopened = project.open_queue().await;
    let resumed = wait_for_status(&reopened, a.id, EntryStatus::Running).await;
    assert_ne!(resumed.worker_id, running.worker_id);
    assert_eq!(
        reopened.snapshot().await.entries[1].id,
        b.id,
        "order is preserved"
    );
    reopened.stop_all().await;
}

#[tokio::test]
async fn test_unrunnable_entries_do_not_block_the_queue() {
    let mut project = TestProject::new();
    project.upload("real.png");
    project.worker(StageType::Upscale, "echo upscaled");
    let queue = project.open_queue().await;
    queue.pause().await;

    let missing = queue
        .enqueue(EnqueueRequest::new("missing.png", StageType::Upscale))
        .await;
    let no_worker = queue
        .enqueue(EnqueueRequest::new("real.png", StageType::PriceFix))
        .await;
    let good = queue
        .enqueue(EnqueueRequest::new("real.png", StageType::Upscale))
        .await;
    queue.resume().await;

    let entries = wait_for_idle(&queue).await;
    let status = |id| entries.iter().find(|e| e.id == id).unwrap().status;
    assert_eq!(status(missing.id), EntryStatus::Error);
    assert_eq!(status(no_worker.id), EntryStatus::Error);
    assert_eq!(status(good.id), EntryStatus::Finished);
}

#[tokio::test]
async fn test_listing_stage_without_reference_errors() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    project.worker(StageType::Finalize, "echo \"$@\"");
    let queue = project.open_queue().await;

    let entry = queue
        .enqueue(EnqueueRequest::new("cat.png", StageType::Finalize))
        .await;
    let done = wait_for_status(&queue, entry.id, EntryStatus::Error).await;
    assert!(done.worker_id.is_none());
    assert!(queue.supervisor().list_jobs().is_empty());
}

#[tokio::test]
async fn test_non_zero_exit_fails_and_labels_artifact() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    project.worker(StageType::Upscale, "echo broken >&2; exit 2");
    let queue = project.open_queue().await;

    let entry = queue
        .enqueue(EnqueueRequest::new("cat.png", StageType::Upscale))
        .await;
    let done = wait_for_status(&queue, entry.id, EntryStatus::Failed).await;

    let worker = queue
        .supervisor()
        .job_record(done.worker_id.unwrap())
        .unwrap();
    assert_eq!(worker.exit_code, Some(2));
    assert!(worker.log.contains("broken"));
    assert_eq!(
        queue.registry().get("cat.png").unwrap().status.as_deref(),
        Some("Upscaled failed")
    );
}

#[tokio::test]
async fn test_retry_requeues_failed_entries() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    // Reports a result and fails on the first run; the retry reports nothing.
    let flag = project.root().join("ran-once");
    project.worker(
        StageType::Upscale,
        &format!(
            "if [ -f '{flag}' ]; then echo second; exit 0; fi\ntouch '{flag}'\n\
             echo \"Final output saved to: /tmp/first-attempt.png\"\nexit 1",
            flag = flag.display()
        ),
    );
    let queue = project.open_queue().await;

    let entry = queue
        .enqueue(EnqueueRequest::new("cat.png", StageType::Upscale))
        .await;
    let failed = wait_for_status(&queue, entry.id, EntryStatus::Failed).await;
    let first_worker = failed.worker_id.unwrap();
    assert_eq!(failed.result_path.as_deref(), Some("/tmp/first-attempt.png"));

    assert_eq!(queue.retry_failed().await, 1);
    let requeued = queue
        .snapshot()
        .await
        .entries
        .into_iter()
        .find(|e| e.id == entry.id)
        .unwrap();
    assert!(requeued.result_path.is_none());
    assert!(requeued.finish_time.is_none() || requeued.status == EntryStatus::Running);

    let retried = wait_for_status(&queue, entry.id, EntryStatus::Finished).await;
    assert_ne!(retried.worker_id, Some(first_worker));
    assert!(
        retried.result_path.is_none(),
        "first attempt's result leaked into the retry"
    );
    let record = queue
        .supervisor()
        .job_record(retried.worker_id.unwrap())
        .unwrap();
    assert!(record.result_path.is_none());
    assert!(!record.log.contains("first-attempt"));

    assert_eq!(queue.retry_failed().await, 0);
    let history = queue.supervisor().list_history();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_remove_running_entry_stops_its_worker() {
    let mut project = TestProject::new();
    project.upload("slow.png");
    project.upload("next.png");
    project.worker(StageType::Upscale, "echo started; sleep 30");
    let queue = project.open_queue().await;

    let slow = queue
        .enqueue(EnqueueRequest::new("slow.png", StageType::Upscale))
        .await;
    let next = queue
        .enqueue(EnqueueRequest::new("next.png", StageType::Upscale))
        .await;
    let running = wait_for_status(&queue, slow.id, EntryStatus::Running).await;
    let worker_id = running.worker_id.unwrap();

    assert!(queue.remove(slow.id).await);
    assert!(!queue.remove(slow.id).await);
    assert!(queue.list().await.iter().all(|v| v.entry.id != slow.id));

    let worker = queue.supervisor().job_record(worker_id).unwrap();
    assert_eq!(worker.status, WorkerStatus::Stopped);

    // The next entry takes over.
    wait_for_status(&queue, next.id, EntryStatus::Running).await;
    queue.stop_all().await;
}

#[tokio::test]
async fn test_pause_holds_entries_and_resume_starts_one() {
    let mut project = TestProject::new();
    project.upload("a.png");
    project.upload("b.png");
    project.worker(StageType::Upscale, "sleep 0.5");
    let queue = project.open_queue().await;

    queue.pause().await;
    queue
        .enqueue(EnqueueRequest::new("a.png", StageType::Upscale))
        .await;
    queue
        .enqueue(EnqueueRequest::new("b.png", StageType::Upscale))
        .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let entries = queue.snapshot().await.entries;
    assert!(entries.iter().all(|e| e.status == EntryStatus::Queued));
    assert!(queue.supervisor().list_jobs().is_empty());

    queue.resume().await;
    let entries = queue.snapshot().await.entries;
    assert_eq!(running_count(&entries), 1);
    assert_eq!(entries[0].status, EntryStatus::Running);

    wait_for_idle(&queue).await;
}

#[tokio::test]
async fn test_pause_is_persisted() {
    let project = TestProject::new();
    {
        let queue = project.open_queue().await;
        queue.pause().await;
    }
    let reopened = project.open_queue().await;
    assert!(reopened.is_paused().await);
}

struct FixedColors;

#[async_trait]
impl ColorDetector for FixedColors {
    async fn detect(&self, _input: &Path) -> Vec<String> {
        vec!["red".to_string(), "navy".to_string()]
    }
}

#[tokio::test]
async fn test_submit_passes_colors_and_records_listing() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    let processed = project.upload("cat-4096-no-bg.png");
    project.worker(
        StageType::Submit,
        "echo \"args: $*\"\n\
         echo 'Product URL: https://shop.example/p/1'\n\
         echo 'Listing URL: https://shop.example/p/2'",
    );
    let queue = project.open_queue_with_colors(Arc::new(FixedColors)).await;

    let entry = queue
        .enqueue(EnqueueRequest::new("cat.png", StageType::Submit))
        .await;
    let done = wait_for_status(&queue, entry.id, EntryStatus::Finished).await;

    assert_eq!(done.product_url.as_deref(), Some("https://shop.example/p/2"));
    let worker = queue
        .supervisor()
        .job_record(done.worker_id.unwrap())
        .unwrap();
    assert!(worker
        .log
        .contains(&format!("args: {} red navy", processed.display())));
    assert_eq!(worker.product_url.as_deref(), Some("https://shop.example/p/2"));

    let artifact = queue.registry().get("cat.png").unwrap();
    assert_eq!(
        artifact.listing_url.as_deref(),
        Some("https://shop.example/p/2")
    );
    assert_eq!(artifact.status.as_deref(), Some("Submitted"));
}

#[tokio::test]
async fn test_submit_uses_configured_color_helper() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    project.color_helper("echo 'white, black, gold, teal'");
    project.worker(StageType::Submit, "echo \"args: $*\"");
    let queue = project.open_queue().await;

    let entry = queue
        .enqueue(
            EnqueueRequest::new("cat.png", StageType::Submit).with_variant(Variant::Normal),
        )
        .await;
    let done = wait_for_status(&queue, entry.id, EntryStatus::Finished).await;

    let worker = queue
        .supervisor()
        .job_record(done.worker_id.unwrap())
        .unwrap();
    let original = project.uploads().join("cat.png");
    assert!(worker
        .log
        .contains(&format!("args: {} white black gold", original.display())));
}

#[tokio::test]
async fn test_title_fix_uses_listing_from_registry() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    project.worker(
        StageType::TitleFix,
        "echo \"listing=$1 input=$2\"\necho 'Updated Title: Draft'\necho 'Updated Title: Sleepy Cat'",
    );
    let queue = project.open_queue().await;
    queue.registry().update("cat.png", &mut |artifact| {
        artifact.status = Some("Listed (Listing URL: https://shop.example/products/77)".to_string());
    });

    let entry = queue
        .enqueue(EnqueueRequest::new("cat.png", StageType::TitleFix))
        .await;
    let done = wait_for_status(&queue, entry.id, EntryStatus::Finished).await;

    assert_eq!(
        done.product_url.as_deref(),
        Some("https://shop.example/products/77")
    );
    let worker = queue
        .supervisor()
        .job_record(done.worker_id.unwrap())
        .unwrap();
    assert!(worker.log.contains("listing=77 input="));

    let artifact = queue.registry().get("cat.png").unwrap();
    assert_eq!(artifact.title.as_deref(), Some("Sleepy Cat"));
    assert_eq!(artifact.status.as_deref(), Some("Title Fixed"));
}

#[tokio::test]
async fn test_mockup_fix_arguments() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    project.worker(StageType::MockupFix, "echo \"args: $*\"");
    let queue = project.open_queue().await;
    queue.registry().update("cat.png", &mut |artifact| {
        artifact.listing_url = Some("https://shop.example/products/5".to_string());
    });

    let entry = queue
        .enqueue(EnqueueRequest::new("cat.png", StageType::MockupFix))
        .await;
    let done = wait_for_status(&queue, entry.id, EntryStatus::Finished).await;

    let worker = queue
        .supervisor()
        .job_record(done.worker_id.unwrap())
        .unwrap();
    assert!(worker
        .log
        .contains("args: FixMockups https://shop.example/products/5"));
}

#[tokio::test]
async fn test_remove_finished_and_stop_all() {
    let mut project = TestProject::new();
    project.upload("a.png");
    project.upload("b.png");
    project.worker(StageType::Upscale, "echo quick");
    let queue = project.open_queue().await;

    queue
        .enqueue(EnqueueRequest::new("a.png", StageType::Upscale))
        .await;
    queue
        .enqueue(EnqueueRequest::new("ghost.png", StageType::Upscale))
        .await;
    wait_for_idle(&queue).await;

    assert_eq!(queue.remove_finished().await, 2);
    assert!(queue.list().await.is_empty());

    project.worker(StageType::Upscale, "sleep 30");
    let queue = project.open_queue().await;
    let slow = queue
        .enqueue(EnqueueRequest::new("b.png", StageType::Upscale))
        .await;
    queue
        .enqueue(EnqueueRequest::new("a.png", StageType::Upscale))
        .await;
    let running = wait_for_status(&queue, slow.id, EntryStatus::Running).await;

    queue.stop_all().await;
    assert!(queue.list().await.is_empty());
    let worker = queue
        .supervisor()
        .job_record(running.worker_id.unwrap())
        .unwrap();
    assert_eq!(worker.status, WorkerStatus::Stopped);

    let on_disk: QueueSnapshot =
        serde_json::from_str(&std::fs::read_to_string(project.config.queue_path()).unwrap())
            .unwrap();
    assert!(on_disk.entries.is_empty());
}

#[tokio::test]
async fn test_events_follow_an_entry_through_its_run() {
    let mut project = TestProject::new();
    project.upload("cat.png");
    project.worker(StageType::Upscale, "echo hello");
    let (queue, mut rx) = project.open_queue_with_events().await;

    let entry = queue
        .enqueue(EnqueueRequest::new("cat.png", StageType::Upscale))
        .await;
    wait_for_status(&queue, entry.id, EntryStatus::Finished).await;

    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::WorkerStarted { tag: Some(tag), .. } if tag == "cat.png")));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::WorkerLogChunk { content, .. } if content.contains("hello"))));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::WorkerFinished {
            status: WorkerStatus::Finished,
            ..
        }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::EntryUpdated { entry: updated } if updated.id == entry.id
            && updated.status == EntryStatus::Finished
    )));
}
