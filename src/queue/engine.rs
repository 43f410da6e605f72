use futures::future::{BoxFuture, FutureExt, Shared as SharedFuture};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tagforged_av::{probe_tool, ProcessLauncher, SystemLauncher, ToolInfo};
use tagforged_common::paths::unique_target_path;
use tagforged_common::{AudioFormat, Error, JobId, Quality, Result, TaskId};

use super::progress::{ProgressFactory, SimulatedProgress};
use super::types::{Job, JobStatus, QueueStatus};
use super::worker;
use crate::config::{Config, EventsConfig, QueueConfig, ToolsConfig};
use crate::events::{EventBus, EventPayload};
use crate::state::{StateStore, Task, TaskStatus, TaskUpdate};

/// Name of the transcoder executable looked up on PATH.
pub const FFMPEG: &str = "ffmpeg";

/// Jobs owned by the engine, guarded by one mutex.
#[derive(Default)]
pub(super) struct QueueState {
    pub pending: VecDeque<Job>,
    pub running: Option<Job>,
    /// Finished jobs, newest first.
    pub history: VecDeque<Job>,
    /// Generation of the worker currently draining the queue.
    pub active_worker: Option<u64>,
    pub next_generation: u64,
}

impl QueueState {
    fn is_reserved(&self, path: &Path) -> bool {
        self.running.iter().any(|j| j.target_path == path)
            || self.pending.iter().any(|j| j.target_path == path)
    }

    fn reserved_paths(&self) -> HashSet<PathBuf> {
        self.running
            .iter()
            .chain(self.pending.iter())
            .map(|j| j.target_path.clone())
            .collect()
    }
}

/// State shared between the public handle and the worker task.
pub(super) struct Shared {
    pub state: Mutex<QueueState>,
    pub store: Arc<StateStore>,
    pub events: Arc<EventBus>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub progress: Arc<dyn ProgressFactory>,
    pub tool: ToolInfo,
    pub settings: QueueConfig,
}

impl Shared {
    pub fn record_started(&self, job: &Job) {
        info!("Starting job {}: {}", job.id, job.file_name());
        let update = TaskUpdate::new()
            .status(TaskStatus::InProgress)
            .step(format!("converting to {}", job.target_format));
        if let Err(e) = self.store.update_task(TaskId::from(job.id), update) {
            warn!("Failed to update task for job {}: {}", job.id, e);
        }
        self.events.emit(EventPayload::JobStarted { job: job.clone() });
    }

    pub fn record_progress(&self, job: &Job) {
        if let Some(running) = self.state.lock().running.as_mut() {
            if running.id == job.id {
                running.progress = job.progress;
            }
        }
        if let Err(e) = self
            .store
            .update_task(TaskId::from(job.id), TaskUpdate::new().progress(job.progress))
        {
            debug!("Failed to update progress for job {}: {}", job.id, e);
        }
        self.events.emit(EventPayload::JobProgress {
            job: job.clone(),
            progress: job.progress,
        });
    }

    /// Move a terminal job out of `running` into history, then report it.
    pub fn record_finished(&self, job: Job) {
        {
            let mut state = self.state.lock();
            if state.running.as_ref().is_some_and(|r| r.id == job.id) {
                state.running = None;
            }
            self.push_history(&mut state, job.clone());
        }

        match job.status {
            JobStatus::Completed => info!("Job {} completed: {:?}", job.id, job.target_path),
            JobStatus::Cancelled => info!("Job {} cancelled", job.id),
            _ => tracing::error!(
                "Job {} failed: {}",
                job.id,
                job.error_message.as_deref().unwrap_or("unknown error")
            ),
        }

        self.finish_task(&job);

        let payload = match job.status {
            JobStatus::Completed => EventPayload::JobCompleted { job },
            JobStatus::Cancelled => EventPayload::JobCancelled { job },
            _ => {
                let error = job.error_message.clone().unwrap_or_default();
                EventPayload::JobFailed { job, error }
            }
        };
        self.events.emit(payload);
    }

    fn finish_task(&self, job: &Job) {
        if let Err(e) = self.store.finish_task(
            TaskId::from(job.id),
            job.status.task_status(),
            job.error_message.clone(),
        ) {
            warn!("Failed to finish task for job {}: {}", job.id, e);
        }
    }

    fn push_history(&self, state: &mut QueueState, job: Job) {
        state.history.push_front(job);
        state.history.truncate(self.settings.history_limit);
    }
}

/// Resolves when the worker task exits.
pub(super) type WorkerDone = SharedFuture<BoxFuture<'static, ()>>;

#[derive(Default)]
struct WorkerSlot {
    cancel: Option<CancellationToken>,
    done: Option<WorkerDone>,
}

/// FIFO conversion queue with a single worker.
///
/// Jobs are converted one at a time, in submission order, by a worker task
/// spawned with [`start`](Self::start). The worker exits when the queue is
/// empty or after [`stop`](Self::stop) cancels the running job. Pending
/// jobs are never dropped implicitly, so a later `start` picks up where
/// the previous run left off.
pub struct JobQueue {
    shared: Arc<Shared>,
    worker: Mutex<WorkerSlot>,
}

impl JobQueue {
    pub fn builder() -> JobQueueBuilder {
        JobQueueBuilder::default()
    }

    /// Queue a conversion of `source_path` into `target_dir`.
    ///
    /// The target file name is the source stem plus the format extension,
    /// with `_1`, `_2`, ... appended when that name exists on disk or is
    /// already claimed by another queued job. Does not start processing.
    pub fn submit(
        &self,
        source_path: impl AsRef<Path>,
        target_format: &str,
        target_dir: impl AsRef<Path>,
        quality: &str,
        delete_source: bool,
    ) -> Result<JobId> {
        let source_path = source_path.as_ref();
        let target_dir = target_dir.as_ref();

        if source_path.as_os_str().is_empty() {
            return Err(Error::invalid_path("source path is empty"));
        }
        if target_dir.as_os_str().is_empty() {
            return Err(Error::invalid_path("target directory is empty"));
        }
        let target_format: AudioFormat = target_format.parse()?;
        let quality: Quality = quality.parse()?;
        let stem = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::invalid_path(format!("no file name in {}", source_path.display()))
            })?;

        let mut job = Job::new(
            source_path.to_path_buf(),
            PathBuf::new(),
            target_format,
            quality,
            delete_source,
        );
        self.shared
            .store
            .register_task(Task::with_id(TaskId::from(job.id), source_path))?;

        // Check the disk without holding the queue lock, then confirm the
        // name is still unclaimed. A concurrent submit that took it in
        // between shows up in the next snapshot.
        loop {
            let reserved = self.shared.state.lock().reserved_paths();
            let candidate = unique_target_path(
                target_dir,
                &stem,
                target_format.extension(),
                |p| reserved.contains(p),
            );

            let mut state = self.shared.state.lock();
            if !state.is_reserved(&candidate) {
                job.target_path = candidate;
                state.pending.push_back(job.clone());
                break;
            }
        }

        debug!(
            "Queued job {}: {:?} -> {:?} ({}, {})",
            job.id, job.source_path, job.target_path, target_format, quality
        );
        let id = job.id;
        self.shared.events.emit(EventPayload::JobQueued { job });
        Ok(id)
    }

    /// Remove a pending job. Returns false if it is running, finished or
    /// unknown.
    pub fn remove(&self, id: JobId) -> bool {
        let job = {
            let mut state = self.shared.state.lock();
            let Some(pos) = state.pending.iter().position(|j| j.id == id) else {
                return false;
            };
            let Some(mut job) = state.pending.remove(pos) else {
                return false;
            };
            job.cancel();
            self.shared.push_history(&mut state, job.clone());
            job
        };

        debug!("Removed job {}", id);
        self.shared.finish_task(&job);
        self.shared.events.emit(EventPayload::JobRemoved { job });
        true
    }

    /// Remove every pending job and return how many were removed.
    ///
    /// The running job, if any, is not affected.
    pub fn clear(&self) -> usize {
        let removed: Vec<Job> = {
            let mut state = self.shared.state.lock();
            let drained: Vec<Job> = state.pending.drain(..).collect();
            let mut removed = Vec::with_capacity(drained.len());
            for mut job in drained {
                job.cancel();
                self.shared.push_history(&mut state, job.clone());
                removed.push(job);
            }
            removed
        };

        let count = removed.len();
        if count > 0 {
            info!("Cleared {} pending jobs", count);
        }
        for job in removed {
            self.shared.finish_task(&job);
            self.shared.events.emit(EventPayload::JobRemoved { job });
        }
        count
    }

    /// Spawn the worker if none is active.
    ///
    /// When the active worker has been stopped but has not exited yet, the
    /// new worker waits for it and then drains the remaining jobs.
    ///
    /// Fails with [`Error::ToolUnavailable`] when the transcoder did not
    /// pass its probe. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let program = self.shared.tool.require()?.to_path_buf();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::internal("JobQueue::start requires a tokio runtime"))?;

        let mut slot = self.worker.lock();
        let stopping = slot.cancel.as_ref().is_some_and(|c| c.is_cancelled());
        let (generation, previous) = {
            let mut state = self.shared.state.lock();
            let previous = match state.active_worker {
                Some(_) if !stopping => return Ok(()),
                Some(_) => slot.done.clone(),
                None => None,
            };
            let generation = state.next_generation;
            state.next_generation += 1;
            state.active_worker = Some(generation);
            (generation, previous)
        };
        if previous.is_some() {
            debug!("Worker is stopping; next worker {} will follow it", generation);
        }

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(worker::run(
            Arc::clone(&self.shared),
            program,
            cancel.clone(),
            generation,
            previous,
        ));
        let done = handle
            .map(|result| {
                if let Err(e) = result {
                    tracing::error!("Queue worker ended abnormally: {}", e);
                }
            })
            .boxed()
            .shared();
        slot.cancel = Some(cancel);
        slot.done = Some(done);
        Ok(())
    }

    /// Request cancellation of the running job.
    ///
    /// The worker wakes immediately, terminates the process, marks the job
    /// Cancelled and exits. A process that already exited cleanly keeps
    /// its result. Pending jobs stay queued.
    pub fn stop(&self) {
        if let Some(cancel) = &self.worker.lock().cancel {
            cancel.cancel();
        }
    }

    /// Wait for the current worker, if any, to exit.
    pub async fn wait(&self) {
        let done = self.worker.lock().done.clone();
        if let Some(done) = done {
            done.await;
        }
    }

    /// [`stop`](Self::stop), then [`wait`](Self::wait).
    pub async fn stop_and_wait(&self) {
        self.stop();
        self.wait().await;
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        let pending = state.pending.len();
        let running = state.running.is_some();
        QueueStatus {
            total: pending + usize::from(running),
            pending,
            running,
            current_job_id: state.running.as_ref().map(|j| j.id),
            worker_active: state.active_worker.is_some(),
        }
    }

    /// Snapshot of a job, wherever it is.
    pub fn job(&self, id: JobId) -> Option<Job> {
        let state = self.shared.state.lock();
        state
            .running
            .iter()
            .chain(state.pending.iter())
            .chain(state.history.iter())
            .find(|j| j.id == id)
            .cloned()
    }

    /// Pending jobs in the order they will run.
    pub fn pending_jobs(&self) -> Vec<Job> {
        self.shared.state.lock().pending.iter().cloned().collect()
    }

    /// Up to `limit` finished jobs, newest first.
    pub fn history(&self, limit: usize) -> Vec<Job> {
        self.shared
            .state
            .lock()
            .history
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Result of the transcoder probe taken when the queue was built.
    pub fn tool(&self) -> &ToolInfo {
        &self.shared.tool
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.shared.store
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        if let Some(cancel) = &self.worker.get_mut().cancel {
            cancel.cancel();
        }
    }
}

/// Builder for [`JobQueue`].
#[derive(Default)]
pub struct JobQueueBuilder {
    queue: QueueConfig,
    tools: ToolsConfig,
    events_config: EventsConfig,
    store: Option<Arc<StateStore>>,
    events: Option<Arc<EventBus>>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    progress: Option<Arc<dyn ProgressFactory>>,
    tool: Option<ToolInfo>,
}

impl JobQueueBuilder {
    /// Take every section of `config`. The `[events]` section only applies
    /// when the builder creates the event bus itself.
    pub fn config(mut self, config: &Config) -> Self {
        self.queue = config.queue.clone();
        self.tools = config.tools.clone();
        self.events_config = config.events.clone();
        self
    }

    pub fn queue_config(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn tools_config(mut self, tools: ToolsConfig) -> Self {
        self.tools = tools;
        self
    }

    pub fn events_config(mut self, events: EventsConfig) -> Self {
        self.events_config = events;
        self
    }

    /// Share an existing state store. Its event bus is used unless
    /// [`events`](Self::events) is also set.
    pub fn store(mut self, store: Arc<StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Replace the OS process launcher.
    pub fn launcher(mut self, launcher: impl ProcessLauncher + 'static) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Replace the progress estimator.
    pub fn progress(mut self, progress: impl ProgressFactory + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Skip probing and use this tool description.
    pub fn tool(mut self, tool: ToolInfo) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Probe the transcoder (unless a tool was supplied) and build the queue.
    pub async fn build(self) -> JobQueue {
        let tool = match self.tool {
            Some(tool) => tool,
            None => {
                probe_tool(
                    FFMPEG,
                    self.tools.ffmpeg_path.as_deref(),
                    "-version",
                    self.tools.probe_timeout(),
                )
                .await
            }
        };
        if tool.available {
            info!(
                "Using {} at {:?} ({})",
                tool.name,
                tool.path,
                tool.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            warn!(
                "{} unavailable: {}",
                tool.name,
                tool.error.as_deref().unwrap_or("unknown error")
            );
        }

        let events = match (&self.events, &self.store) {
            (Some(events), _) => Arc::clone(events),
            (None, Some(store)) => Arc::clone(store.events()),
            (None, None) => Arc::new(EventBus::from_config(&self.events_config)),
        };
        let store = self
            .store
            .unwrap_or_else(|| StateStore::new(Arc::clone(&events)));
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(SystemLauncher) as Arc<dyn ProcessLauncher>);
        let progress = self.progress.unwrap_or_else(|| {
            Arc::new(SimulatedProgress::new(
                self.queue.progress_step,
                self.queue.progress_ceiling,
            )) as Arc<dyn ProgressFactory>
        });

        JobQueue {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                store,
                events,
                launcher,
                progress,
                tool,
                settings: self.queue,
            }),
            worker: Mutex::new(WorkerSlot::default()),
        }
    }
}
