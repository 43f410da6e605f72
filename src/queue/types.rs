use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use tagforged_common::{AudioFormat, JobId, Quality};

use crate::state::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Matching status for the job's task in the state store.
    pub fn task_status(&self) -> TaskStatus {
        match self {
            Self::Pending => TaskStatus::Pending,
            Self::Running => TaskStatus::InProgress,
            Self::Completed => TaskStatus::Success,
            Self::Failed => TaskStatus::Error,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file conversion.
///
/// `progress` is an estimate advanced on each poll tick, not a
/// measurement of encoder position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source_path: PathBuf,
    /// Collision-free destination, fixed at submission.
    pub target_path: PathBuf,
    /// Detected from the source extension; informational only.
    pub source_format: Option<AudioFormat>,
    pub target_format: AudioFormat,
    pub quality: Quality,
    pub delete_source: bool,
    pub status: JobStatus,
    pub progress: f32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        source_path: PathBuf,
        target_path: PathBuf,
        target_format: AudioFormat,
        quality: Quality,
        delete_source: bool,
    ) -> Self {
        let source_format = source_path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(AudioFormat::from_extension);

        Self {
            id: JobId::new(),
            source_path,
            target_path,
            source_format,
            target_format,
            quality,
            delete_source,
            status: JobStatus::Pending,
            progress: 0.0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn update_progress(&mut self, progress: f32) {
        self.progress = progress.clamp(0.0, 100.0);
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// `pending` plus the running job, if any.
    pub total: usize,
    pub pending: usize,
    pub running: bool,
    pub current_job_id: Option<JobId>,
    /// Whether a worker task is active.
    pub worker_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_format_from_extension() {
        let job = Job::new(
            "/in/Track.WAV".into(),
            "/out/Track.mp3".into(),
            AudioFormat::Mp3,
            Quality::Standard,
            false,
        );
        assert_eq!(job.source_format, Some(AudioFormat::Wav));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.file_name(), "Track.WAV");

        let job = Job::new(
            "/in/notes".into(),
            "/out/notes.flac".into(),
            AudioFormat::Flac,
            Quality::Low,
            false,
        );
        assert_eq!(job.source_format, None);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut job = Job::new(
            "/in/a.mp3".into(),
            "/out/a.flac".into(),
            AudioFormat::Flac,
            Quality::High,
            false,
        );
        job.start();
        assert!(job.started_at.is_some());
        job.update_progress(120.0);
        assert_eq!(job.progress, 100.0);
        job.fail("Process exited with code 1: bad input");
        assert!(job.status.is_terminal());
        assert_eq!(job.status.task_status(), TaskStatus::Error);
    }
}
