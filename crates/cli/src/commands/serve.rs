//! JSON-lines serving loop.
//!
//! Each stdin line is one `Op`. Each stdout line is either
//! `{"reply": {...}}`, answering the op read before it, or
//! `{"event": {...}}`, published by the core whenever something changes.
//! `shutdown` or end of input stops the running worker and exits; its entry
//! stays queued for the next start.

use color_eyre::eyre::WrapErr;
use pq_core::config::loader::load_config;
use pq_core::events::EventSink;
use pq_core::queue::PipelineQueue;
use pq_protocol::ipc::{Event, Op, Reply};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

const EVENT_BUFFER: usize = 1024;
const SHUTDOWN_WAIT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Outgoing<'a> {
    Reply(&'a Reply),
    Event(&'a Event),
}

pub async fn run(root: &Path) -> color_eyre::Result<()> {
    let config = load_config(root).await?;
    let (tx, mut events) = mpsc::channel(EVENT_BUFFER);
    let queue = PipelineQueue::open_project(&config, EventSink::new(tx)).await;
    info!(root = %config.root.display(), "Serving pipeline queue on stdin/stdout");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.wrap_err("failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match parse_op(&line) {
                    Ok(Op::Shutdown) => break,
                    Ok(op) => handle(&queue, op).await,
                    Err(reply) => reply,
                };
                write_line(&mut stdout, &Outgoing::Reply(&reply)).await?;
            }
            Some(event) = events.recv() => {
                write_line(&mut stdout, &Outgoing::Event(&event)).await?;
            }
        }
    }

    shutdown(&queue).await;
    while let Ok(event) = events.try_recv() {
        write_line(&mut stdout, &Outgoing::Event(&event)).await?;
    }
    info!("Pipeline queue stopped");
    Ok(())
}

fn parse_op(line: &str) -> Result<Op, Reply> {
    serde_json::from_str(line).map_err(|e| Reply::Error {
        message: format!("invalid operation: {e}"),
    })
}

/// Apply one operation and build its reply.
async fn handle(queue: &PipelineQueue, op: Op) -> Reply {
    let supervisor = queue.supervisor();
    match op {
        Op::Enqueue(request) => Reply::Enqueued {
            entry: queue.enqueue(request).await,
        },
        Op::List => Reply::Entries {
            entries: queue.list().await,
        },
        Op::ListPage { limit, offset } => Reply::Page(queue.list_page(limit, offset).await),
        Op::Remove { entry_id } => Reply::Removed {
            removed: queue.remove(entry_id).await,
        },
        Op::RemoveByRecord { record_id } => Reply::Count {
            count: queue.remove_by_record(record_id).await,
        },
        Op::RemoveFinished => Reply::Count {
            count: queue.remove_finished().await,
        },
        Op::RetryFailed => Reply::Count {
            count: queue.retry_failed().await,
        },
        Op::Reorder { ids } => Reply::Reordered {
            reordered: queue.reorder(&ids).await,
        },
        Op::Pause => {
            queue.pause().await;
            Reply::Ack
        }
        Op::Resume => {
            queue.resume().await;
            Reply::Ack
        }
        Op::GetState => Reply::State {
            paused: queue.is_paused().await,
        },
        Op::StopAll => {
            queue.stop_all().await;
            Reply::Ack
        }
        Op::ListJobs => Reply::Jobs {
            jobs: supervisor.list_jobs(),
        },
        Op::ListHistory => Reply::Jobs {
            jobs: supervisor.list_history(),
        },
        Op::GetJob { worker_id } => Reply::Job {
            record: supervisor.job_record(worker_id),
        },
        Op::StopJob { worker_id } => acknowledge(
            supervisor.stop_job(worker_id),
            format!("worker {worker_id} is not running"),
        ),
        Op::ForceFinishJob { worker_id } => acknowledge(
            supervisor.force_finish_job(worker_id),
            format!("worker {worker_id} is not running"),
        ),
        Op::Shutdown => Reply::Ack,
    }
}

fn acknowledge(done: bool, message: String) -> Reply {
    if done {
        Reply::Ack
    } else {
        Reply::Error { message }
    }
}

/// Close the queue, putting in-flight entries back as queued, and wait for
/// the stopped workers to exit.
async fn shutdown(queue: &PipelineQueue) {
    let supervisor = queue.supervisor();
    for id in queue.shutdown().await {
        match tokio::time::timeout(SHUTDOWN_WAIT, supervisor.wait_exited(id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(worker_id = %id, error = %e, "Worker vanished during shutdown"),
            Err(_) => warn!(worker_id = %id, "Worker still alive at shutdown"),
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(
    out: &mut W,
    message: &Outgoing<'_>,
) -> color_eyre::Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}
