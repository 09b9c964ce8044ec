//! The pipeline queue.
//!
//! `PipelineQueue` holds an ordered list of entries and runs them one at a
//! time through the [`ProcessSupervisor`]. Every mutation is persisted and
//! followed by a dispatch attempt, so the queue keeps moving until it is
//! empty, paused, or busy with a running entry.
//!
//! An entry that cannot be launched (missing input, missing worker, no
//! listing reference) ends in the `error` state and dispatch continues with
//! the next queued entry in the same pass.
//!
//! - [`resolve`]: input candidate search
//! - [`stage`]: per-stage argument contract
//! - [`extract`]: parsing results out of worker logs
//! - [`colors`]: color helper for submissions
//! - [`store`]: queue file persistence

pub mod colors;
pub mod error;
pub mod extract;
pub mod resolve;
pub mod stage;
pub mod store;

pub use colors::{ColorDetector, HelperColorDetector, NoColors};
pub use error::DispatchError;
pub use store::QueueStore;

use crate::artifacts::{ArtifactRegistry, JsonArtifactRegistry};
use crate::config::models::AppConfig;
use crate::events::EventSink;
use crate::worker::{HistoryLedger, JobOptions, ProcessSupervisor, SupervisorOptions};
use chrono::Utc;
use pq_protocol::config_models::SupervisorConfig;
use pq_protocol::ipc::Event;
use pq_protocol::queue_models::{
    EnqueueRequest, EntryPage, EntryStatus, EntryView, PipelineEntry, QueueSnapshot, StageType,
};
use pq_protocol::worker_models::WorkerRecord;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A worker finished for the entry with this id.
type CompletionMessage = (Uuid, WorkerRecord);

struct QueueState {
    entries: Vec<PipelineEntry>,
    paused: bool,
    /// Entry whose worker is running.
    current: Option<Uuid>,
    /// Set by `shutdown`; nothing starts afterwards.
    closed: bool,
}

impl QueueState {
    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            entries: self.entries.clone(),
            paused: self.paused,
        }
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    config: SupervisorConfig,
    supervisor: Arc<ProcessSupervisor>,
    registry: Arc<dyn ArtifactRegistry>,
    colors: Arc<dyn ColorDetector>,
    store: QueueStore,
    events: EventSink,
    completions: mpsc::UnboundedSender<CompletionMessage>,
}

/// Sequential scheduler for pipeline entries.
///
/// Cloning is cheap; clones share the same queue.
///
/// # Example
///
/// ```no_run
/// use pq_core::config::loader::load_config;
/// use pq_core::events::EventSink;
/// use pq_core::queue::PipelineQueue;
/// use pq_protocol::queue_models::{EnqueueRequest, StageType};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// let queue = PipelineQueue::open_project(&config, EventSink::disabled()).await;
/// queue.enqueue(EnqueueRequest::new("cat.png", StageType::Upscale)).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PipelineQueue {
    inner: Arc<QueueInner>,
}

/// Wiring for a [`PipelineQueue`].
pub struct QueueBuilder {
    config: SupervisorConfig,
    supervisor: Arc<ProcessSupervisor>,
    registry: Arc<dyn ArtifactRegistry>,
    colors: Option<Arc<dyn ColorDetector>>,
    store: QueueStore,
    events: EventSink,
}

impl QueueBuilder {
    pub fn store(mut self, store: QueueStore) -> Self {
        self.store = store;
        self
    }

    /// Override the color detector derived from the configuration.
    pub fn colors(mut self, colors: Arc<dyn ColorDetector>) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Load the persisted queue and start scheduling.
    ///
    /// Entries that were running when the previous process died are put
    /// back to `queued`; the first runnable one is dispatched before this
    /// returns. Must be called from within a tokio runtime.
    pub async fn open(self) -> PipelineQueue {
        let colors = self
            .colors
            .unwrap_or_else(|| default_colors(&self.config));
        let snapshot = self.store.load();

        let mut entries = snapshot.entries;
        let mut coerced = 0;
        for entry in &mut entries {
            if entry.status == EntryStatus::Running {
                entry.status = EntryStatus::Queued;
                entry.worker_id = None;
                coerced += 1;
            }
            if entry.record_id.is_none() {
                entry.record_id = self.registry.record_id(&entry.file);
            }
        }
        info!(
            entries = entries.len(),
            coerced,
            paused = snapshot.paused,
            "Loaded pipeline queue"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                entries,
                paused: snapshot.paused,
                current: None,
                closed: false,
            }),
            config: self.config,
            supervisor: self.supervisor,
            registry: self.registry,
            colors,
            store: self.store,
            events: self.events,
            completions: tx,
        });
        tokio::spawn(run_completions(Arc::downgrade(&inner), rx));

        {
            let mut state = inner.state.lock().await;
            inner.persist(&state);
            inner.dispatch(&mut state).await;
        }

        PipelineQueue { inner }
    }
}

fn default_colors(config: &SupervisorConfig) -> Arc<dyn ColorDetector> {
    match &config.color_helper {
        Some(helper) => Arc::new(HelperColorDetector::new(
            helper,
            std::time::Duration::from_secs(config.color_helper_timeout_secs),
        )),
        None => Arc::new(NoColors),
    }
}

/// Feed worker completions back into the queue for as long as it exists.
async fn run_completions(
    queue: Weak<QueueInner>,
    mut rx: mpsc::UnboundedReceiver<CompletionMessage>,
) {
    while let Some((entry_id, record)) = rx.recv().await {
        let Some(inner) = queue.upgrade() else {
            break;
        };
        inner.complete(entry_id, record).await;
    }
}

impl PipelineQueue {
    pub fn builder(
        config: SupervisorConfig,
        supervisor: Arc<ProcessSupervisor>,
        registry: Arc<dyn ArtifactRegistry>,
    ) -> QueueBuilder {
        QueueBuilder {
            config,
            supervisor,
            registry,
            colors: None,
            store: QueueStore::in_memory(),
            events: EventSink::disabled(),
        }
    }

    /// Open the queue of a project with every piece persisted under its
    /// state directory.
    pub async fn open_project(config: &AppConfig, events: EventSink) -> Self {
        let supervisor = ProcessSupervisor::new(HistoryLedger::load(config.history_path()))
            .with_options(SupervisorOptions {
                stop_grace: config.stop_grace(),
                ..Default::default()
            })
            .with_events(events.clone());
        let registry = JsonArtifactRegistry::load(config.artifacts_path());

        Self::builder(
            config.supervisor.clone(),
            Arc::new(supervisor),
            Arc::new(registry),
        )
        .store(QueueStore::at(config.queue_path()))
        .events(events)
        .open()
        .await
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.inner.supervisor
    }

    pub fn registry(&self) -> &Arc<dyn ArtifactRegistry> {
        &self.inner.registry
    }

    /// Add an entry and try to start it.
    ///
    /// The file is not checked here; an entry whose input cannot be found
    /// fails when its turn comes. Returns the entry as stored after the
    /// dispatch attempt.
    pub async fn enqueue(&self, request: EnqueueRequest) -> PipelineEntry {
        let mut entry = PipelineEntry::new(request.file, request.stage);
        entry.record_id = request
            .record_id
            .or_else(|| self.inner.registry.record_id(&entry.file));
        entry.variant = request.variant;
        let id = entry.id;

        let mut state = self.inner.state.lock().await;
        if request.insert_at_front {
            state.entries.insert(0, entry.clone());
        } else {
            state.entries.push(entry.clone());
        }
        debug!(entry_id = %id, file = %entry.file, stage = %entry.stage, "Enqueued entry");
        self.inner.persist(&state);
        self.inner.events.emit(Event::EntryUpdated {
            entry: entry.clone(),
        });
        self.inner.dispatch(&mut state).await;

        state
            .position(id)
            .map(|idx| state.entries[idx].clone())
            .unwrap_or(entry)
    }

    /// Every entry in dispatch order.
    pub async fn list(&self) -> Vec<EntryView> {
        let mut state = self.inner.state.lock().await;
        self.inner.backfill_record_ids(&mut state);
        state.entries.iter().cloned().map(view).collect()
    }

    /// A page of artifact groups.
    ///
    /// Entries are grouped by record id (or file, without one) in order of
    /// first appearance. The page holds every entry of groups
    /// `offset..offset + limit`, in dispatch order.
    pub async fn list_page(&self, limit: usize, offset: usize) -> EntryPage {
        let entries = self.list().await;

        let mut groups: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for view in &entries {
            let key = view.entry.group_key();
            if seen.insert(key.clone()) {
                groups.push(key);
            }
        }

        let selected: HashSet<&String> = groups.iter().skip(offset).take(limit).collect();
        let entries = entries
            .into_iter()
            .filter(|view| selected.contains(&view.entry.group_key()))
            .collect();

        EntryPage {
            entries,
            total_groups: groups.len(),
        }
    }

    /// Remove one entry, stopping its worker first if it is running.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(idx) = state.position(id) else {
            return false;
        };
        let entry = state.entries.remove(idx);
        self.inner.release(&mut state, &entry);
        debug!(entry_id = %id, "Removed entry");

        self.inner.persist(&state);
        self.inner.events.emit(Event::EntryRemoved { entry_id: id });
        self.inner.dispatch(&mut state).await;
        true
    }

    /// Remove every entry of one artifact record. Returns how many were
    /// removed.
    pub async fn remove_by_record(&self, record_id: i64) -> usize {
        let mut state = self.inner.state.lock().await;
        self.inner.backfill_record_ids(&mut state);

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.entries)
            .into_iter()
            .partition(|e| e.record_id == Some(record_id));
        state.entries = kept;
        if removed.is_empty() {
            return 0;
        }

        for entry in &removed {
            self.inner.release(&mut state, entry);
            self.inner
                .events
                .emit(Event::EntryRemoved { entry_id: entry.id });
        }
        debug!(record_id, removed = removed.len(), "Removed entries for record");

        self.inner.persist(&state);
        self.inner.dispatch(&mut state).await;
        removed.len()
    }

    /// Drop entries that reached an end state. Returns how many were
    /// removed.
    pub async fn remove_finished(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|e| !e.status.is_terminal());
        let removed = before - state.entries.len();

        if removed > 0 {
            debug!(removed, "Removed finished entries");
            self.inner.persist(&state);
        }
        removed
    }

    /// Put failed and errored entries back in the queue. Returns how many
    /// were requeued.
    pub async fn retry_failed(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        let mut retried = Vec::new();
        for entry in state.entries.iter_mut().filter(|e| e.status.is_retryable()) {
            entry.status = EntryStatus::Queued;
            entry.worker_id = None;
            entry.start_time = None;
            entry.finish_time = None;
            entry.result_path = None;
            if entry.stage == StageType::Submit {
                entry.product_url = None;
            }
            retried.push(entry.clone());
        }
        if retried.is_empty() {
            return 0;
        }

        info!(count = retried.len(), "Retrying failed entries");
        let count = retried.len();
        self.inner.persist(&state);
        for entry in retried {
            self.inner.events.emit(Event::EntryUpdated { entry });
        }
        self.inner.dispatch(&mut state).await;
        count
    }

    /// Give the queued entries a new order.
    ///
    /// `ids` must name exactly the queued entries, each once; otherwise
    /// nothing changes and `false` is returned. Entries in other states keep
    /// their positions.
    pub async fn reorder(&self, ids: &[Uuid]) -> bool {
        let mut state = self.inner.state.lock().await;
        let slots: Vec<usize> = state
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == EntryStatus::Queued)
            .map(|(idx, _)| idx)
            .collect();

        let queued: HashSet<Uuid> = slots.iter().map(|&idx| state.entries[idx].id).collect();
        let requested: HashSet<Uuid> = ids.iter().copied().collect();
        if requested.len() != ids.len() || requested != queued {
            debug!("Rejected reorder that does not match the queued entries");
            return false;
        }

        let mut by_id: HashMap<Uuid, PipelineEntry> = slots
            .iter()
            .map(|&idx| (state.entries[idx].id, state.entries[idx].clone()))
            .collect();
        for (&slot, id) in slots.iter().zip(ids) {
            if let Some(entry) = by_id.remove(id) {
                state.entries[slot] = entry;
            }
        }

        debug!(count = ids.len(), "Reordered queue");
        self.inner.persist(&state);
        true
    }

    /// Stop starting new entries. A running entry is left alone.
    pub async fn pause(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.paused {
            state.paused = true;
            info!("Queue paused");
            self.inner.persist(&state);
        }
    }

    /// Resume scheduling and start the next entry if idle.
    pub async fn resume(&self) {
        let mut state = self.inner.state.lock().await;
        if state.paused {
            state.paused = false;
            info!("Queue resumed");
            self.inner.persist(&state);
            self.inner.dispatch(&mut state).await;
        }
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.state.lock().await.paused
    }

    /// Stop the running worker and clear the queue.
    ///
    /// Does not wait for the worker to exit.
    pub async fn stop_all(&self) {
        let mut state = self.inner.state.lock().await;
        let entries = std::mem::take(&mut state.entries);
        for entry in &entries {
            self.inner.release(&mut state, entry);
        }
        state.current = None;

        info!(cleared = entries.len(), "Stopped all entries");
        self.inner.persist(&state);
    }

    /// Stop scheduling for good and hand in-flight work back to the queue.
    ///
    /// Running entries are persisted as `queued` before their workers are
    /// stopped, so the next open starts them again. The pause flag on disk
    /// is left as it was. Returns the ids of the stopped workers; use
    /// [`ProcessSupervisor::wait_exited`] to wait for the processes.
    pub async fn shutdown(&self) -> Vec<Uuid> {
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        state.current = None;

        let mut workers = Vec::new();
        let mut requeued = Vec::new();
        for entry in state
            .entries
            .iter_mut()
            .filter(|e| e.status == EntryStatus::Running)
        {
            entry.status = EntryStatus::Queued;
            entry.start_time = None;
            workers.extend(entry.worker_id.take());
            requeued.push(entry.clone());
        }

        info!(requeued = requeued.len(), "Queue shut down");
        self.inner.persist(&state);
        for entry in requeued {
            self.inner.events.emit(Event::EntryUpdated { entry });
        }
        for &worker_id in &workers {
            self.inner.supervisor.stop_job(worker_id);
        }
        workers
    }

    /// Entries and pause flag as they would be persisted.
    pub async fn snapshot(&self) -> QueueSnapshot {
        self.inner.state.lock().await.snapshot()
    }
}

fn view(entry: PipelineEntry) -> EntryView {
    EntryView {
        location: entry.stage.site(),
        entry,
    }
}

impl QueueInner {
    fn persist(&self, state: &QueueState) {
        self.store.save(&state.snapshot());
        self.events.emit(Event::QueueChanged {
            paused: state.paused,
            length: state.entries.len(),
        });
    }

    fn backfill_record_ids(&self, state: &mut QueueState) {
        for entry in state.entries.iter_mut().filter(|e| e.record_id.is_none()) {
            entry.record_id = self.registry.record_id(&entry.file);
        }
    }

    /// Detach a removed entry from its worker.
    fn release(&self, state: &mut QueueState, entry: &PipelineEntry) {
        if entry.status == EntryStatus::Running {
            if let Some(worker_id) = entry.worker_id {
                self.supervisor.stop_job(worker_id);
            }
        }
        if state.current == Some(entry.id) {
            state.current = None;
        }
    }

    /// Start the next queued entry unless paused or busy.
    ///
    /// Entries that cannot be launched are marked `error` and skipped, so a
    /// single pass either starts one worker or exhausts the queued entries.
    async fn dispatch(&self, state: &mut QueueState) {
        loop {
            if state.closed || state.paused || state.current.is_some() {
                return;
            }
            let Some(idx) = state
                .entries
                .iter()
                .position(|e| e.status == EntryStatus::Queued)
            else {
                return;
            };

            let entry = {
                let entry = &mut state.entries[idx];
                entry.status = EntryStatus::Running;
                entry.start_time = Some(Utc::now());
                entry.finish_time = None;
                entry.clone()
            };
            state.current = Some(entry.id);
            self.persist(state);
            self.events.emit(Event::EntryUpdated {
                entry: entry.clone(),
            });

            let planned = stage::plan(
                &entry,
                &self.config,
                self.registry.as_ref(),
                self.colors.as_ref(),
            )
            .await;
            let launched = planned.and_then(|plan| {
                let listing_url = plan.listing_url.clone();
                self.launch(&entry, plan).map(|worker_id| (worker_id, listing_url))
            });

            let updated = &mut state.entries[idx];
            match launched {
                Ok((worker_id, listing_url)) => {
                    updated.worker_id = Some(worker_id);
                    if listing_url.is_some() {
                        updated.product_url = listing_url;
                    }
                    let snapshot = updated.clone();
                    self.persist(state);
                    self.events.emit(Event::EntryUpdated { entry: snapshot });
                    return;
                }
                Err(e) => {
                    warn!(
                        entry_id = %entry.id,
                        file = %entry.file,
                        stage = %entry.stage,
                        error = %e,
                        "Entry cannot run"
                    );
                    updated.status = EntryStatus::Error;
                    updated.finish_time = Some(Utc::now());
                    let snapshot = updated.clone();
                    state.current = None;
                    self.persist(state);
                    self.events.emit(Event::EntryUpdated { entry: snapshot });
                }
            }
        }
    }

    fn launch(
        &self,
        entry: &PipelineEntry,
        plan: stage::LaunchPlan,
    ) -> Result<Uuid, DispatchError> {
        let command = plan.executable.to_string_lossy().into_owned();
        let options = JobOptions::default()
            .in_dir(plan.working_directory)
            .tagged(entry.file.clone());
        let worker = self
            .supervisor
            .create_job(&command, plan.args, options)
            .map_err(|e| DispatchError::Launch(e.to_string()))?;

        info!(
            entry_id = %entry.id,
            worker_id = %worker.id(),
            stage = %entry.stage,
            file = %entry.file,
            "Dispatched entry"
        );

        let tx = self.completions.clone();
        let entry_id = entry.id;
        worker.subscribe_completion(Box::new(move |record| {
            let _ = tx.send((entry_id, record.clone()));
        }));
        Ok(worker.id())
    }

    /// Fold a finished worker back into its entry and move on.
    async fn complete(&self, entry_id: Uuid, record: WorkerRecord) {
        let mut state = self.state.lock().await;
        let matching = state
            .position(entry_id)
            .filter(|&idx| state.entries[idx].worker_id == Some(record.id));

        let Some(idx) = matching else {
            debug!(
                entry_id = %entry_id,
                worker_id = %record.id,
                "Ignoring completion of a detached worker"
            );
            self.dispatch(&mut state).await;
            return;
        };

        if state.current == Some(entry_id) {
            state.current = None;
        }
        let entry = &mut state.entries[idx];
        entry.status = EntryStatus::from(record.status);
        entry.finish_time = record.finish_time.or_else(|| Some(Utc::now()));
        self.apply_results(entry, &record);
        info!(entry_id = %entry_id, status = %entry.status, "Entry completed");

        let snapshot = entry.clone();
        self.persist(&state);
        self.events.emit(Event::EntryUpdated { entry: snapshot });
        self.dispatch(&mut state).await;
    }

    /// Pull results out of the worker log into the entry, the artifact
    /// registry and the worker record.
    fn apply_results(&self, entry: &mut PipelineEntry, record: &WorkerRecord) {
        let key = entry.file.clone();
        let mut result_path = None;
        let mut product_url = None;

        match entry.stage {
            StageType::Upscale => {
                if let Some(path) = extract::result_path(&record.log) {
                    let upscaled = PathBuf::from(&path);
                    self.registry.update(&key, &mut |artifact| {
                        artifact.upscaled_path = Some(upscaled.clone());
                    });
                    entry.result_path = Some(path.clone());
                    result_path = Some(path);
                }
            }
            StageType::Submit => {
                if let Some(url) = extract::listing_url(&record.log) {
                    self.registry.update(&key, &mut |artifact| {
                        artifact.listing_url = Some(url.clone());
                    });
                    entry.product_url = Some(url.clone());
                    entry.result_path = Some(url.clone());
                    result_path = Some(url.clone());
                    product_url = Some(url);
                }
            }
            StageType::TitleFix => {
                if let Some(title) = extract::updated_title(&record.log) {
                    self.registry.update(&key, &mut |artifact| {
                        artifact.title = Some(title.clone());
                    });
                }
            }
            StageType::PriceFix | StageType::MockupFix | StageType::Finalize => {}
        }

        if let Some(label) = stage::status_label(entry.stage, entry.status) {
            let record_id = entry.record_id;
            self.registry.update(&key, &mut |artifact| {
                artifact.status = Some(label.clone());
                if artifact.record_id.is_none() {
                    artifact.record_id = record_id;
                }
            });
        }

        if result_path.is_some() || product_url.is_some() {
            if let Err(e) = self
                .supervisor
                .record_results(record.id, result_path, product_url)
            {
                debug!(error = %e, "Could not attach results to worker record");
            }
        }
    }
}
