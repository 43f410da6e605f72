//! Process adapter for the external transcoder.
//!
//! A [`ProcessLauncher`] starts one tool process and hands back a
//! [`ProcessHandle`] that the job worker polls on every tick. The handle owns
//! the process for its whole lifetime; dropping it kills the process.
//!
//! Stderr is drained continuously by a background task into a bounded tail
//! buffer. ffmpeg writes a status line several times per second, and an
//! unread pipe would eventually block it.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tagforged_common::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Number of stderr lines retained for error reporting.
const MAX_OUTPUT_LINES: usize = 200;

/// How long `collect_output` waits for the stderr reader to hit EOF.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a non-blocking process check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Still running.
    Running,
    /// Exited with the given code; `None` when terminated by a signal.
    Exited(Option<i32>),
}

impl ProcessState {
    /// Exited with status zero.
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessState::Exited(Some(0)))
    }
}

/// A running (or finished) tool process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Non-blocking status check.
    fn poll(&mut self) -> Result<ProcessState>;

    /// Most recent non-empty stderr line, if any.
    fn last_output_line(&self) -> Option<String>;

    /// Kill the process and reap it. Succeeds if it already exited.
    async fn terminate(&mut self) -> Result<()>;

    /// Captured stderr, once the process has exited.
    async fn collect_output(&mut self) -> String;
}

/// Starts tool processes.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `program` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailure`] if the executable cannot be started.
    fn launch(&self, program: &Path, args: &[String]) -> Result<Box<dyn ProcessHandle>>;
}

/// Launcher backed by real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> Result<Box<dyn ProcessHandle>> {
        Ok(Box::new(ToolProcess::spawn(program, args)?))
    }
}

/// Bounded buffer of the newest stderr lines.
#[derive(Debug, Default)]
struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.lines.len() >= MAX_OUTPUT_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn last(&self) -> Option<String> {
        self.lines.back().cloned()
    }

    fn joined(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// A tool process spawned through tokio.
pub struct ToolProcess {
    program: String,
    child: Child,
    output: Arc<Mutex<OutputTail>>,
    reader: Option<JoinHandle<()>>,
    exited: Option<ProcessState>,
}

impl ToolProcess {
    /// Spawn the process with stdin closed, stdout discarded and stderr
    /// captured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self> {
        let program_name = program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| program.to_string_lossy().to_string());

        tracing::debug!("Launching {} {:?}", program.display(), args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::launch_failure(&program_name, e.to_string()))?;

        let output = Arc::new(Mutex::new(OutputTail::default()));
        let reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_lines(stderr, Arc::clone(&output))));

        Ok(Self {
            program: program_name,
            child,
            output,
            reader,
            exited: None,
        })
    }

    /// OS process id, while the process is alive.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl ProcessHandle for ToolProcess {
    fn poll(&mut self) -> Result<ProcessState> {
        if let Some(state) = self.exited {
            return Ok(state);
        }
        match self.child.try_wait()? {
            Some(status) => {
                let state = ProcessState::Exited(status.code());
                self.exited = Some(state);
                Ok(state)
            }
            None => Ok(ProcessState::Running),
        }
    }

    fn last_output_line(&self) -> Option<String> {
        self.output.lock().last()
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.exited.is_some() {
            return Ok(());
        }
        tracing::debug!("Terminating {}", self.program);
        if let Err(e) = self.child.start_kill() {
            // InvalidInput means the process already exited.
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(e.into());
            }
        }
        let status = self.child.wait().await?;
        self.exited = Some(ProcessState::Exited(status.code()));
        Ok(())
    }

    async fn collect_output(&mut self) -> String {
        if let Some(reader) = self.reader.take() {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
                tracing::debug!("{} stderr did not reach EOF in time", self.program);
            }
        }
        self.output.lock().joined()
    }
}

/// Read `stream` to EOF, splitting on `\n` and `\r` (ffmpeg rewrites its
/// status line with carriage returns).
async fn drain_lines<R>(mut stream: R, output: Arc<Mutex<OutputTail>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("stderr read failed: {}", e);
                break;
            }
        };

        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !pending.is_empty() {
                    output.lock().push(&String::from_utf8_lossy(&pending));
                    pending.clear();
                }
            } else {
                pending.push(byte);
            }
        }
    }

    if !pending.is_empty() {
        output.lock().push(&String::from_utf8_lossy(&pending));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_tail_is_bounded() {
        let mut tail = OutputTail::default();
        for i in 0..(MAX_OUTPUT_LINES + 10) {
            tail.push(&format!("line {i}"));
        }
        assert_eq!(tail.lines.len(), MAX_OUTPUT_LINES);
        assert_eq!(tail.last().as_deref(), Some("line 209"));
        assert!(tail.joined().starts_with("line 10\n"));
    }

    #[test]
    fn output_tail_skips_blank_lines() {
        let mut tail = OutputTail::default();
        tail.push("   ");
        tail.push("");
        assert!(tail.last().is_none());
    }

    #[tokio::test]
    async fn drain_splits_on_carriage_returns() {
        let output = Arc::new(Mutex::new(OutputTail::default()));
        let data: &[u8] = b"size=1kB\rsize=2kB\rsize=3kB\nError opening output";
        drain_lines(data, Arc::clone(&output)).await;

        let tail = output.lock();
        assert_eq!(tail.lines.len(), 4);
        assert_eq!(tail.last().as_deref(), Some("Error opening output"));
    }

    #[tokio::test]
    async fn launch_missing_program_fails() {
        let result = SystemLauncher.launch(Path::new("nonexistent_tool_xyz_12345"), &[]);
        assert!(matches!(result, Err(Error::LaunchFailure { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_collects_stderr() {
        let args = vec!["-c".to_string(), "echo broken input >&2; exit 3".to_string()];
        let mut process = SystemLauncher.launch(Path::new("/bin/sh"), &args).unwrap();

        let state = loop {
            match process.poll().unwrap() {
                ProcessState::Running => tokio::time::sleep(Duration::from_millis(10)).await,
                exited => break exited,
            }
        };
        assert_eq!(state, ProcessState::Exited(Some(3)));
        assert!(!state.is_success());
        assert_eq!(process.collect_output().await, "broken input");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_stops_long_running_process() {
        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let mut process = SystemLauncher.launch(Path::new("/bin/sh"), &args).unwrap();
        assert_eq!(process.poll().unwrap(), ProcessState::Running);

        process.terminate().await.unwrap();
        assert!(matches!(process.poll().unwrap(), ProcessState::Exited(_)));
        // A second terminate is a no-op.
        process.terminate().await.unwrap();
    }
}
