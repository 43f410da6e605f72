//! The queue worker.
//!
//! One worker task drains the queue front to back. Each job gets its own
//! process, polled every `poll_interval` until it exits, times out or the
//! worker is cancelled. A panic while processing a job fails that job and
//! the loop moves on.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tagforged_av::{command, ProcessHandle, ProcessState};
use tagforged_common::Error;

use super::engine::{Shared, WorkerDone};
use super::types::{Job, JobStatus};
use crate::events::{panic_message, EventPayload};

/// Releases the worker slot if the loop exits without doing so itself
/// (cancellation or a panic outside job processing).
///
/// The slot is only cleared while it still names this worker; a worker
/// started behind this one has already claimed it. That worker does not
/// dequeue until this one is gone, so a job left in `running` is always
/// ours.
struct ActiveGuard {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let stranded = {
            let mut state = self.shared.state.lock();
            if state.active_worker == Some(self.generation) {
                state.active_worker = None;
            }
            state.running.take()
        };

        if let Some(mut job) = stranded {
            warn!("Worker exited while job {} was running", job.id);
            job.fail("worker exited unexpectedly");
            self.shared.record_finished(job);
        }
    }
}

pub(super) async fn run(
    shared: Arc<Shared>,
    program: PathBuf,
    cancel: CancellationToken,
    generation: u64,
    previous: Option<WorkerDone>,
) {
    let _guard = ActiveGuard {
        shared: Arc::clone(&shared),
        generation,
    };
    if let Some(previous) = previous {
        previous.await;
    }
    info!("Queue worker started");

    let drained = loop {
        if cancel.is_cancelled() {
            break false;
        }

        // Dequeue and release the slot under the same lock, so a job
        // submitted concurrently is either seen here or starts a new worker.
        let job = {
            let mut state = shared.state.lock();
            match state.pending.pop_front() {
                Some(mut job) => {
                    job.start();
                    state.running = Some(job.clone());
                    job
                }
                None => {
                    if state.active_worker == Some(generation) {
                        state.active_worker = None;
                    }
                    break true;
                }
            }
        };

        shared.record_started(&job);

        let fallback = job.clone();
        let job = match AssertUnwindSafe(process_job(&shared, &program, job, &cancel))
            .catch_unwind()
            .await
        {
            Ok(job) => job,
            Err(panic) => {
                let mut job = fallback;
                job.fail(&format!(
                    "worker panicked: {}",
                    panic_message(panic.as_ref())
                ));
                job
            }
        };

        let cancelled = job.status == JobStatus::Cancelled;
        shared.record_finished(job);
        if cancelled {
            break false;
        }
    };

    if drained {
        info!("Queue drained");
        shared.events.emit(EventPayload::QueueDrained);
    } else {
        info!("Queue worker stopped");
    }
}

/// Run one job to a terminal state.
async fn process_job(
    shared: &Shared,
    program: &Path,
    mut job: Job,
    cancel: &CancellationToken,
) -> Job {
    if let Some(dir) = job.target_path.parent() {
        if !dir.as_os_str().is_empty() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                job.fail(&format!(
                    "Failed to create output directory {}: {}",
                    dir.display(),
                    e
                ));
                return job;
            }
        }
    }

    let args = command::conversion_args(
        &job.source_path,
        &job.target_path,
        job.target_format,
        job.quality,
    );
    debug!("Running {} {}", program.display(), args.join(" "));

    let mut process = match shared.launcher.launch(program, &args) {
        Ok(process) => process,
        Err(e) => {
            job.fail(&e.to_string());
            return job;
        }
    };

    let mut progress = shared.progress.create();
    let timeout = shared.settings.job_timeout();
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut ticker = tokio::time::interval(shared.settings.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // A process that already finished cleanly keeps its result.
                if matches!(process.poll(), Ok(state) if state.is_success()) {
                    complete(&mut job).await;
                    return job;
                }
                abort(&mut process, &job.target_path).await;
                job.cancel();
                return job;
            }
            _ = ticker.tick() => {}
        }

        match process.poll() {
            Ok(ProcessState::Running) => {
                if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                    if Instant::now() >= deadline {
                        abort(&mut process, &job.target_path).await;
                        job.fail(&Error::Timeout(timeout).to_string());
                        return job;
                    }
                }

                let last_line = process.last_output_line();
                let next = progress.tick(job.progress, last_line.as_deref());
                if next != job.progress {
                    job.update_progress(next);
                    shared.record_progress(&job);
                }
            }
            Ok(state) if state.is_success() => {
                complete(&mut job).await;
                return job;
            }
            Ok(ProcessState::Exited(code)) => {
                let stderr = process.collect_output().await;
                remove_partial(&job.target_path).await;
                job.fail(&Error::NonZeroExit { code, stderr }.to_string());
                return job;
            }
            Err(e) => {
                abort(&mut process, &job.target_path).await;
                job.fail(&e.to_string());
                return job;
            }
        }
    }
}

async fn complete(job: &mut Job) {
    job.complete();
    if job.delete_source {
        delete_source(&job.source_path).await;
    }
}

async fn abort(process: &mut Box<dyn ProcessHandle>, target: &Path) {
    if let Err(e) = process.terminate().await {
        warn!("Failed to terminate process: {}", e);
    }
    remove_partial(target).await;
}

/// Best effort: a failed deletion is logged and the job stays Completed.
async fn delete_source(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted source {:?}", path),
        Err(source) => {
            let err = Error::SourceDeletion {
                path: path.to_path_buf(),
                source,
            };
            warn!("{}", err);
        }
    }
}

async fn remove_partial(target: &Path) {
    match tokio::fs::remove_file(target).await {
        Ok(()) => debug!("Removed partial output {:?}", target),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {:?}: {}", target, e),
    }
}
