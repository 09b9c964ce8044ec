//! A single spawned worker process.
//!
//! `WorkerProcess` holds the state of one external process: its record, the
//! captured log and the subscribers interested in output and completion.
//! The OS child itself is owned by the supervisor's watcher task; this type
//! only sees the effects (chunks, exit, stop requests).
//!
//! Completion is a single-fire event. Whichever path reaches a terminal
//! state first (normal exit, launch failure, stop, force finish) closes the
//! latch and takes the completion subscribers; every later path only updates
//! the record.

use chrono::Utc;
use parking_lot::Mutex;
use pq_protocol::worker_models::{WorkerRecord, WorkerStatus};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

/// Callback receiving each chunk of output as it arrives.
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback receiving the final record once the worker is done.
pub type CompletionCallback = Box<dyn FnOnce(&WorkerRecord) + Send>;

/// Handle returned by the subscribe methods, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Launch parameters for a worker.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Working directory of the child. Inherits the supervisor's when `None`.
    pub working_directory: Option<PathBuf>,

    /// Free-form label copied into the record.
    pub tag: Option<String>,
}

impl JobOptions {
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

struct State {
    record: WorkerRecord,
    log_subscribers: Vec<(SubscriptionId, LogCallback)>,
    completion_subscribers: Vec<(SubscriptionId, CompletionCallback)>,
    completed: bool,
}

/// Outcome of a terminal transition attempt.
pub(crate) struct Completion {
    pub record: WorkerRecord,
    pub callbacks: Vec<CompletionCallback>,
}

impl Completion {
    /// Invoke the taken completion callbacks. Called outside any lock.
    pub fn fire(self) {
        for callback in self.callbacks {
            callback(&self.record);
        }
    }
}

/// One external process and everything observed about it.
pub struct WorkerProcess {
    id: Uuid,
    state: Mutex<State>,
    next_subscription: AtomicU64,
    done_tx: watch::Sender<bool>,
    exited_tx: watch::Sender<bool>,
    stop_requested: Notify,
}

impl WorkerProcess {
    pub(crate) fn new(command: String, args: Vec<String>, options: JobOptions) -> Self {
        let id = Uuid::new_v4();
        let record = WorkerRecord {
            id,
            command,
            args,
            working_directory: options.working_directory,
            tag: options.tag,
            status: WorkerStatus::Running,
            start_time: Utc::now(),
            finish_time: None,
            exit_code: None,
            log: String::new(),
            result_path: None,
            product_url: None,
        };
        let (done_tx, _) = watch::channel(false);
        let (exited_tx, _) = watch::channel(false);

        Self {
            id,
            state: Mutex::new(State {
                record,
                log_subscribers: Vec::new(),
                completion_subscribers: Vec::new(),
                completed: false,
            }),
            next_subscription: AtomicU64::new(1),
            done_tx,
            exited_tx,
            stop_requested: Notify::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.lock().record.status
    }

    /// Copy of the current record, log included.
    pub fn snapshot(&self) -> WorkerRecord {
        self.state.lock().record.clone()
    }

    pub fn log(&self) -> String {
        self.state.lock().record.log.clone()
    }

    /// Whether the completion event has fired.
    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Register a callback for every future chunk of output.
    pub fn subscribe_log(&self, callback: LogCallback) -> SubscriptionId {
        let id = self.next_id();
        self.state.lock().log_subscribers.push((id, callback));
        id
    }

    /// Remove a log subscriber. Unknown ids are ignored.
    pub fn unsubscribe_log(&self, id: SubscriptionId) {
        self.state.lock().log_subscribers.retain(|(sub, _)| *sub != id);
    }

    /// Register a callback for the completion event.
    ///
    /// If the worker has already completed, the callback runs immediately on
    /// the calling thread.
    pub fn subscribe_completion(&self, callback: CompletionCallback) -> SubscriptionId {
        let id = self.next_id();
        let mut state = self.state.lock();
        if state.completed {
            let record = state.record.clone();
            drop(state);
            callback(&record);
        } else {
            state.completion_subscribers.push((id, callback));
        }
        id
    }

    /// Remove a completion subscriber. Unknown ids are ignored.
    pub fn unsubscribe_completion(&self, id: SubscriptionId) {
        self.state
            .lock()
            .completion_subscribers
            .retain(|(sub, _)| *sub != id);
    }

    /// Wait until the completion event has fired and return the record.
    pub async fn wait(&self) -> WorkerRecord {
        let mut rx = self.done_tx.subscribe();
        // The sender lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
        self.snapshot()
    }

    /// Wait until the process itself is gone.
    ///
    /// Unlike [`wait`](Self::wait), this does not resolve on a stop request
    /// or a force finish, only once the exit (or launch failure) was seen.
    pub async fn wait_exited(&self) {
        let mut rx = self.exited_tx.subscribe();
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Attach result fields extracted by a completion consumer.
    pub fn set_results(&self, result_path: Option<String>, product_url: Option<String>) {
        let mut state = self.state.lock();
        if result_path.is_some() {
            state.record.result_path = result_path;
        }
        if product_url.is_some() {
            state.record.product_url = product_url;
        }
    }

    /// Append output and forward it to log subscribers.
    pub(crate) fn append(&self, chunk: &str) {
        let subscribers: Vec<LogCallback> = {
            let mut state = self.state.lock();
            state.record.log.push_str(chunk);
            state
                .log_subscribers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };
        for callback in subscribers {
            callback(chunk);
        }
    }

    /// Record the end of the worker.
    ///
    /// Returns the completion to fire when this call closed the latch. When
    /// the latch was already closed (stopped or force-finished earlier) the
    /// trailer and exit code are still recorded but nothing fires.
    pub(crate) fn finish(
        &self,
        status: WorkerStatus,
        exit_code: Option<i32>,
        trailer: &str,
    ) -> Option<Completion> {
        let (subscribers, completion) = {
            let mut state = self.state.lock();
            state.record.log.push_str(trailer);
            state.record.exit_code = exit_code;
            let subscribers: Vec<LogCallback> = state
                .log_subscribers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect();

            let completion = if state.completed {
                None
            } else {
                state.record.status = status;
                state.record.finish_time = Some(Utc::now());
                Some(self.close_latch(&mut state))
            };
            (subscribers, completion)
        };
        self.exited_tx.send_replace(true);
        for callback in subscribers {
            callback(trailer);
        }
        completion
    }

    /// Mark the worker stopped and ask the watcher to terminate the child.
    ///
    /// Returns `None` when the worker was not running.
    pub(crate) fn request_stop(&self) -> Option<Completion> {
        let completion = {
            let mut state = self.state.lock();
            if state.completed || state.record.status != WorkerStatus::Running {
                return None;
            }
            state.record.status = WorkerStatus::Stopped;
            state.record.finish_time = Some(Utc::now());
            self.close_latch(&mut state)
        };
        self.stop_requested.notify_one();
        Some(completion)
    }

    /// Mark a still-running worker finished without having seen it exit.
    pub(crate) fn force_finish(&self) -> Option<Completion> {
        let mut state = self.state.lock();
        if state.completed || state.record.status != WorkerStatus::Running {
            return None;
        }
        state.record.status = WorkerStatus::Finished;
        state.record.finish_time = Some(Utc::now());
        state.record.log.push_str("\n[force finished]");
        Some(self.close_latch(&mut state))
    }

    /// Resolves once a stop has been requested.
    pub(crate) async fn stop_requested(&self) {
        self.stop_requested.notified().await;
    }

    fn close_latch(&self, state: &mut State) -> Completion {
        state.completed = true;
        let callbacks = state
            .completion_subscribers
            .drain(..)
            .map(|(_, callback)| callback)
            .collect();
        self.done_tx.send_replace(true);
        Completion {
            record: state.record.clone(),
            callbacks,
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WorkerProcess")
            .field("id", &self.id)
            .field("command", &state.record.command)
            .field("status", &state.record.status)
            .finish()
    }
}
