//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`JobQueue`] to a fresh
//! [`StateStore`] and [`EventBus`] and replaces ffmpeg with a scripted
//! [`FakeLauncher`]. Source and output files live in a temporary directory.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use tagforged::config::QueueConfig;
use tagforged::events::{topics, EventBus};
use tagforged::queue::JobQueue;
use tagforged::state::StateStore;
use tagforged_av::{ProcessHandle, ProcessLauncher, ProcessState, ToolInfo};
use tagforged_common::{Error, Result};

// ---------------------------------------------------------------------------
// Scripted process launcher
// ---------------------------------------------------------------------------

/// What one launched fake process does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Report Running for `polls` ticks, then exit with `code`.
    Exit {
        polls: usize,
        code: Option<i32>,
        stderr: String,
    },
    /// Report Running until `after` has passed since launch, then exit
    /// cleanly. Lets a test stop the queue after the tool already finished.
    ExitAfter(Duration),
    /// Run until terminated.
    Hang,
    /// Fail to launch.
    LaunchError,
    /// Panic inside `launch`.
    Panic,
}

impl Script {
    pub fn success(polls: usize) -> Self {
        Script::Exit {
            polls,
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failure(polls: usize, code: i32, stderr: &str) -> Self {
        Script::Exit {
            polls,
            code: Some(code),
            stderr: stderr.to_string(),
        }
    }
}

#[derive(Default)]
struct LauncherInner {
    scripts: VecDeque<Script>,
    launches: Vec<Vec<String>>,
    terminated: usize,
}

/// Launches fake processes following queued [`Script`]s; once the queue
/// is empty every launch succeeds after two polls.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    inner: Arc<Mutex<LauncherInner>>,
    alive: Arc<AtomicUsize>,
    max_alive: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scripts(scripts: impl IntoIterator<Item = Script>) -> Self {
        let launcher = Self::default();
        launcher.inner.lock().scripts.extend(scripts);
        launcher
    }

    /// Argument lists of every launch so far.
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.inner.lock().launches.clone()
    }

    pub fn terminated(&self) -> usize {
        self.inner.lock().terminated
    }

    /// Highest number of fake processes alive at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_alive.load(Ordering::SeqCst)
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, _program: &Path, args: &[String]) -> Result<Box<dyn ProcessHandle>> {
        let script = {
            let mut inner = self.inner.lock();
            inner.launches.push(args.to_vec());
            inner.scripts.pop_front().unwrap_or_else(|| Script::success(2))
        };

        match script {
            Script::LaunchError => Err(Error::launch_failure("ffmpeg", "No such file or directory")),
            Script::Panic => panic!("launcher exploded"),
            script => {
                let alive = self.alive.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_alive.fetch_max(alive, Ordering::SeqCst);
                Ok(Box::new(FakeProcess {
                    script,
                    target: args.last().map(PathBuf::from),
                    polls: 0,
                    launched: Instant::now(),
                    exited: None,
                    launcher: self.clone(),
                }))
            }
        }
    }
}

struct FakeProcess {
    script: Script,
    target: Option<PathBuf>,
    polls: usize,
    launched: Instant,
    exited: Option<ProcessState>,
    launcher: FakeLauncher,
}

impl FakeProcess {
    fn exit(&mut self, state: ProcessState) -> ProcessState {
        if self.exited.is_none() {
            self.launcher.alive.fetch_sub(1, Ordering::SeqCst);
            self.exited = Some(state);
        }
        state
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn poll(&mut self) -> Result<ProcessState> {
        if let Some(state) = self.exited {
            return Ok(state);
        }
        self.polls += 1;
        // Write some partial output on the first tick, like ffmpeg would.
        if self.polls == 1 {
            if let Some(target) = &self.target {
                std::fs::write(target, b"partial")?;
            }
        }
        match &self.script {
            Script::Exit { polls, code, .. } if self.polls > *polls => {
                let code = *code;
                Ok(self.exit(ProcessState::Exited(code)))
            }
            Script::ExitAfter(after) if self.launched.elapsed() >= *after => {
                Ok(self.exit(ProcessState::Exited(Some(0))))
            }
            _ => Ok(ProcessState::Running),
        }
    }

    fn last_output_line(&self) -> Option<String> {
        Some(format!("size={}kB", self.polls * 64))
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.exited.is_none() {
            self.launcher.inner.lock().terminated += 1;
            self.exit(ProcessState::Exited(None));
        }
        Ok(())
    }

    async fn collect_output(&mut self) -> String {
        match &self.script {
            Script::Exit { stderr, .. } => stderr.clone(),
            _ => String::new(),
        }
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        if self.exited.is_none() {
            self.launcher.alive.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Queue settings with a short poll interval so tests run quickly.
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        poll_interval_ms: 5,
        ..QueueConfig::default()
    }
}

pub struct TestHarness {
    pub queue: JobQueue,
    pub store: Arc<StateStore>,
    pub events: Arc<EventBus>,
    pub launcher: FakeLauncher,
    pub dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_launcher(FakeLauncher::new()).await
    }

    pub async fn with_launcher(launcher: FakeLauncher) -> Self {
        Self::with_config(launcher, fast_config()).await
    }

    pub async fn with_config(launcher: FakeLauncher, config: QueueConfig) -> Self {
        let events = Arc::new(EventBus::default());
        let store = StateStore::new(Arc::clone(&events));
        let queue = JobQueue::builder()
            .queue_config(config)
            .store(Arc::clone(&store))
            .launcher(launcher.clone())
            .tool(ToolInfo::available("ffmpeg", "/usr/bin/ffmpeg"))
            .build()
            .await;

        Self {
            queue,
            store,
            events,
            launcher,
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    /// Create a source file under `<tmp>/in/`.
    pub fn source(&self, name: &str) -> PathBuf {
        let dir = self.dir.path().join("in");
        std::fs::create_dir_all(&dir).expect("failed to create input dir");
        let path = dir.join(name);
        std::fs::write(&path, b"RIFF....WAVE").expect("failed to write source");
        path
    }

    /// Output directory `<tmp>/out/` (not created).
    pub fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Record the topic of every event published from now on.
    pub fn record_topics(&self) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        self.events.subscribe(topics::ALL, move |event| {
            sink.lock().push(event.topic.clone());
            Ok(())
        });
        seen
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
