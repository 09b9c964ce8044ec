//! Process supervisor for external worker programs.
//!
//! The `ProcessSupervisor` launches workers, captures their combined output,
//! turns their exit into a terminal status and fires completion subscribers
//! exactly once per worker. Every worker is mirrored into the
//! [`HistoryLedger`] on creation and on every status change.

use crate::events::EventSink;
use crate::worker::error::SupervisorError;
use crate::worker::history::HistoryLedger;
use crate::worker::process::{
    Completion, CompletionCallback, JobOptions, LogCallback, SubscriptionId, WorkerProcess,
};
use parking_lot::Mutex;
use pq_protocol::ipc::Event;
use pq_protocol::worker_models::{WorkerRecord, WorkerStatus, WorkerSummary};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tuning knobs for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Time between the termination request and a hard kill.
    pub stop_grace: Duration,

    /// How long to keep reading output after the child has exited. Bounds
    /// the wait when a grandchild still holds the pipes open.
    pub drain_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// Owns every worker created during this run.
///
/// # Example
///
/// ```no_run
/// use pq_core::worker::{HistoryLedger, JobOptions, ProcessSupervisor};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let supervisor = ProcessSupervisor::new(HistoryLedger::in_memory());
/// let worker = supervisor.create_job(
///     "echo",
///     vec!["hello".to_string()],
///     JobOptions::default(),
/// )?;
/// let record = worker.wait().await;
/// println!("{} -> {}", record.id, record.status);
/// # Ok(())
/// # }
/// ```
pub struct ProcessSupervisor {
    jobs: Mutex<Vec<Arc<WorkerProcess>>>,
    ledger: Arc<HistoryLedger>,
    options: SupervisorOptions,
    events: EventSink,
}

impl ProcessSupervisor {
    pub fn new(ledger: HistoryLedger) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            ledger: Arc::new(ledger),
            options: SupervisorOptions::default(),
            events: EventSink::disabled(),
        }
    }

    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Launch `command` with `args` and return its handle immediately.
    ///
    /// Must be called from within a tokio runtime. The returned worker is
    /// `Running`, or already `Error` when the process could not be spawned.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::EmptyCommand` for a blank command; nothing
    /// is recorded in that case.
    pub fn create_job(
        &self,
        command: &str,
        args: Vec<String>,
        options: JobOptions,
    ) -> Result<Arc<WorkerProcess>, SupervisorError> {
        if command.trim().is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }

        let mut cmd = Command::new(command);
        cmd.args(&args);
        if let Some(dir) = &options.working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        // Own process group, so a stop reaches the worker's children too.
        #[cfg(unix)]
        cmd.process_group(0);

        let worker = Arc::new(WorkerProcess::new(command.to_string(), args, options));
        self.jobs.lock().push(Arc::clone(&worker));
        self.ledger.upsert(&worker.snapshot());

        self.events.emit(Event::WorkerStarted {
            worker_id: worker.id(),
            command: command.to_string(),
            tag: worker.snapshot().tag,
        });
        if self.events.is_enabled() {
            let events = self.events.clone();
            let worker_id = worker.id();
            worker.subscribe_log(Arc::new(move |chunk| {
                events.emit(Event::WorkerLogChunk {
                    worker_id,
                    content: chunk.to_string(),
                });
            }));
        }

        match cmd.spawn() {
            Ok(child) => {
                info!(worker_id = %worker.id(), command, pid = child.id(), "Worker started");
                tokio::spawn(watch_child(
                    child,
                    Arc::clone(&worker),
                    Arc::clone(&self.ledger),
                    self.events.clone(),
                    self.options.clone(),
                ));
            }
            Err(e) => {
                warn!(worker_id = %worker.id(), command, error = %e, "Failed to spawn worker");
                let trailer = format!("[error] Failed to spawn command '{command}': {e}");
                let completion = worker.finish(WorkerStatus::Error, None, &trailer);
                settle(&self.ledger, &self.events, &worker, completion);
            }
        }

        Ok(worker)
    }

    /// Request termination of a running worker.
    ///
    /// Returns `false` when no such worker exists. Stopping a worker that is
    /// no longer running has no effect.
    pub fn stop_job(&self, id: Uuid) -> bool {
        let Some(worker) = self.get_job(id) else {
            return false;
        };
        let completion = worker.request_stop();
        if completion.is_some() {
            info!(worker_id = %id, "Worker stop requested");
            settle(&self.ledger, &self.events, &worker, completion);
        }
        true
    }

    /// Mark a worker finished although its exit was never observed.
    ///
    /// Returns `true` if the worker was running and has now been finished.
    /// A worker that already completed through any other path is left as is
    /// and its subscribers are not notified again.
    pub fn force_finish_job(&self, id: Uuid) -> bool {
        let Some(worker) = self.get_job(id) else {
            return false;
        };
        let completion = worker.force_finish();
        let forced = completion.is_some();
        if forced {
            warn!(worker_id = %id, "Worker force finished");
            settle(&self.ledger, &self.events, &worker, completion);
        }
        forced
    }

    pub fn get_job(&self, id: Uuid) -> Option<Arc<WorkerProcess>> {
        self.jobs.lock().iter().find(|w| w.id() == id).cloned()
    }

    /// Record of a worker, live if it belongs to this run, else from history.
    pub fn job_record(&self, id: Uuid) -> Option<WorkerRecord> {
        match self.get_job(id) {
            Some(worker) => Some(worker.snapshot()),
            None => self.ledger.get(id),
        }
    }

    /// Workers created during this run, oldest first.
    pub fn list_jobs(&self) -> Vec<WorkerSummary> {
        self.jobs
            .lock()
            .iter()
            .map(|w| w.snapshot().summary())
            .collect()
    }

    /// Every worker in the persisted ledger, oldest first.
    pub fn list_history(&self) -> Vec<WorkerSummary> {
        self.ledger.list()
    }

    pub fn get_history(&self, id: Uuid) -> Option<WorkerRecord> {
        self.ledger.get(id)
    }

    pub fn subscribe_log(&self, id: Uuid, callback: LogCallback) -> Option<SubscriptionId> {
        self.get_job(id).map(|w| w.subscribe_log(callback))
    }

    pub fn unsubscribe_log(&self, id: Uuid, subscription: SubscriptionId) {
        if let Some(worker) = self.get_job(id) {
            worker.unsubscribe_log(subscription);
        }
    }

    pub fn subscribe_completion(
        &self,
        id: Uuid,
        callback: CompletionCallback,
    ) -> Option<SubscriptionId> {
        self.get_job(id).map(|w| w.subscribe_completion(callback))
    }

    pub fn unsubscribe_completion(&self, id: Uuid, subscription: SubscriptionId) {
        if let Some(worker) = self.get_job(id) {
            worker.unsubscribe_completion(subscription);
        }
    }

    /// Attach extracted result fields to a worker and its history record.
    pub fn record_results(
        &self,
        id: Uuid,
        result_path: Option<String>,
        product_url: Option<String>,
    ) -> Result<(), SupervisorError> {
        let worker = self.get_job(id).ok_or(SupervisorError::NotFound(id))?;
        worker.set_results(result_path, product_url);
        self.ledger.upsert(&worker.snapshot());
        Ok(())
    }

    /// Wait for a worker of this run to complete.
    pub async fn wait(&self, id: Uuid) -> Result<WorkerRecord, SupervisorError> {
        let worker = self.get_job(id).ok_or(SupervisorError::NotFound(id))?;
        Ok(worker.wait().await)
    }

    /// Wait for the process of a worker of this run to be gone, stop
    /// escalation included.
    pub async fn wait_exited(&self, id: Uuid) -> Result<(), SupervisorError> {
        let worker = self.get_job(id).ok_or(SupervisorError::NotFound(id))?;
        worker.wait_exited().await;
        Ok(())
    }
}

/// Persist the worker's current record and fire its completion, if any.
fn settle(
    ledger: &HistoryLedger,
    events: &EventSink,
    worker: &WorkerProcess,
    completion: Option<Completion>,
) {
    ledger.upsert(&worker.snapshot());
    if let Some(completion) = completion {
        events.emit(Event::WorkerFinished {
            worker_id: worker.id(),
            status: completion.record.status,
        });
        completion.fire();
    }
}

/// Drive one child to its end: pump output, honor stop requests, record the
/// exit.
async fn watch_child(
    mut child: Child,
    worker: Arc<WorkerProcess>,
    ledger: Arc<HistoryLedger>,
    events: EventSink,
    options: SupervisorOptions,
) {
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Arc::clone(&worker)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Arc::clone(&worker)));
    }

    let exit = tokio::select! {
        exit = child.wait() => exit,
        _ = worker.stop_requested() => terminate(&mut child, options.stop_grace).await,
    };

    for mut reader in readers {
        if tokio::time::timeout(options.drain_timeout, &mut reader)
            .await
            .is_err()
        {
            debug!(worker_id = %worker.id(), "Output still open after exit, detaching reader");
            reader.abort();
        }
    }

    let (status, code, trailer) = interpret_exit(exit);
    info!(worker_id = %worker.id(), %status, code, "Worker exited");
    let completion = worker.finish(status, code, &trailer);
    settle(&ledger, &events, &worker, completion);
}

fn interpret_exit(exit: std::io::Result<ExitStatus>) -> (WorkerStatus, Option<i32>, String) {
    match exit {
        Ok(status) => match status.code() {
            Some(0) => (
                WorkerStatus::Finished,
                Some(0),
                "\n[process exited with code 0]".to_string(),
            ),
            Some(code) => (
                WorkerStatus::Failed,
                Some(code),
                format!("\n[process exited with code {code}]"),
            ),
            None => (
                WorkerStatus::Failed,
                None,
                format!("\n[process terminated: {status}]"),
            ),
        },
        Err(e) => (WorkerStatus::Error, None, format!("\n[error] {e}")),
    }
}

fn spawn_reader<R>(mut stream: R, worker: Arc<WorkerProcess>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => worker.append(&String::from_utf8_lossy(&buf[..n])),
                Err(e) => {
                    debug!(worker_id = %worker.id(), error = %e, "Worker output read failed");
                    break;
                }
            }
        }
    })
}

/// Ask the child to exit, then kill it if it is still alive after `grace`.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    signal_group(child, false);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(exit) => exit,
        Err(_) => {
            warn!(pid = child.id(), "Worker ignored termination request, killing");
            signal_group(child, true);
            let _ = child.start_kill();
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn signal_group(child: &mut Child, hard: bool) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let signal = if hard { Signal::SIGKILL } else { Signal::SIGTERM };
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        debug!(pid, error = %e, "Failed to signal worker process group");
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _hard: bool) {
    let _ = child.start_kill();
}
