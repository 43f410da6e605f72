use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tagforged_common::{EntityId, TaskId};

/// Status of a task or entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Error,
    Cancelled,
}

impl TaskStatus {
    /// Success, Error and Cancelled are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of tracked work: a conversion job, an album import, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub subject_path: PathBuf,
    pub status: TaskStatus,
    pub progress: f32,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(subject_path: impl Into<PathBuf>) -> Self {
        Self::with_id(TaskId::new(), subject_path)
    }

    pub fn with_id(id: TaskId, subject_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            subject_path: subject_path.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            current_step: None,
            error_message: None,
            registered_at: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn apply(&mut self, update: TaskUpdate) {
        if let Some(status) = update.status {
            if status == TaskStatus::InProgress && self.start_time.is_none() {
                self.start_time = Some(Utc::now());
            }
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.clamp(0.0, 100.0);
        }
        if let Some(step) = update.current_step {
            self.current_step = Some(step);
        }
    }

    pub(crate) fn finish(&mut self, status: TaskStatus, error_message: Option<String>) {
        self.status = status;
        self.end_time = Some(Utc::now());
        self.current_step = None;
        if status == TaskStatus::Success {
            self.progress = 100.0;
        }
        if error_message.is_some() {
            self.error_message = error_message;
        }
    }
}

/// Partial update for a task. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<f32>,
    pub current_step: Option<String>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }
}

/// A domain record, such as an album being imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub path: Option<PathBuf>,
    pub status: TaskStatus,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            path: None,
            status: TaskStatus::Pending,
            attributes: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub(crate) fn apply(&mut self, update: EntityUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(path) = update.path {
            self.path = Some(path);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        for key in &update.remove_attributes {
            self.attributes.remove(key);
        }
        self.attributes.extend(update.attributes);
        self.updated_at = Utc::now();
    }
}

/// Partial update for an entity. Attributes are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityUpdate {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub status: Option<TaskStatus>,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub remove_attributes: Vec<String>,
}

impl EntityUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.remove_attributes.push(key.into());
        self
    }
}

/// Aggregate counters.
///
/// `total` counts registered tasks; each finished task bumps exactly one of
/// `succeeded`, `failed` or `cancelled`. Named counters are free-form.
///
/// `revision` goes up by one on every change, resets included. Concurrent
/// mutations may deliver `stats.changed` events out of order; keep the
/// snapshot with the highest revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(default)]
    pub revision: u64,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub counters: BTreeMap<String, u64>,
}

impl StatsSnapshot {
    /// Tasks that have reached a terminal status.
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn success_rate(&self) -> f32 {
        let finished = self.finished();
        if finished == 0 {
            return 0.0;
        }
        (self.succeeded as f32 / finished as f32) * 100.0
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Newer than `other`.
    pub fn supersedes(&self, other: &StatsSnapshot) -> bool {
        self.revision > other.revision
    }

    pub(crate) fn record_finish(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Success => self.succeeded += 1,
            TaskStatus::Error => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
            TaskStatus::Pending | TaskStatus::InProgress => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_update_sets_start_time_once() {
        let mut task = Task::new("/music/a.mp3");
        task.apply(TaskUpdate::new().status(TaskStatus::InProgress).progress(150.0));
        let started = task.start_time;
        assert!(started.is_some());
        assert_eq!(task.progress, 100.0);

        task.apply(TaskUpdate::new().status(TaskStatus::InProgress).step("tagging"));
        assert_eq!(task.start_time, started);
        assert_eq!(task.current_step.as_deref(), Some("tagging"));
    }

    #[test]
    fn entity_update_merges_attributes() {
        let mut entity = Entity::new("Album")
            .with_attribute("year", serde_json::json!(1999))
            .with_attribute("genre", serde_json::json!("rock"));
        entity.apply(
            EntityUpdate::new()
                .set("year", serde_json::json!(2001))
                .unset("genre")
                .status(TaskStatus::InProgress),
        );
        assert_eq!(entity.attributes.get("year"), Some(&serde_json::json!(2001)));
        assert!(!entity.attributes.contains_key("genre"));
        assert_eq!(entity.status, TaskStatus::InProgress);
    }

    #[test]
    fn stats_success_rate() {
        let mut stats = StatsSnapshot::default();
        assert_eq!(stats.success_rate(), 0.0);
        stats.record_finish(TaskStatus::Success);
        stats.record_finish(TaskStatus::Error);
        assert_eq!(stats.finished(), 2);
        assert_eq!(stats.success_rate(), 50.0);
    }

    #[test]
    fn task_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
