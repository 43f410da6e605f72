use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Explicit ffmpeg executable; falls back to a PATH lookup.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Timeout for the `-version` availability probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout() -> u64 {
    5
}

impl ToolsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// How often the worker checks the running process and the stop flag.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Estimated progress added per poll tick.
    #[serde(default = "default_progress_step")]
    pub progress_step: f32,

    /// Estimated progress never exceeds this until the job completes.
    #[serde(default = "default_progress_ceiling")]
    pub progress_ceiling: f32,

    /// Kill a conversion that runs longer than this.
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,

    /// Finished jobs kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_poll_interval() -> u64 {
    250
}
fn default_progress_step() -> f32 {
    5.0
}
fn default_progress_ceiling() -> f32 {
    95.0
}
fn default_history_limit() -> usize {
    1000
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            progress_step: default_progress_step(),
            progress_ceiling: default_progress_ceiling(),
            job_timeout_secs: None,
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Broadcast channel buffer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Events kept in the recent-events ring buffer.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_channel_capacity() -> usize {
    256
}
fn default_recent_limit() -> usize {
    100
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            recent_limit: default_recent_limit(),
        }
    }
}
