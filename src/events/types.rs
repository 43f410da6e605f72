use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tagforged_common::{EntityId, TaskId};

use crate::queue::Job;
use crate::state::{Entity, StatsSnapshot, Task};

/// Topic names published by the queue and the state store.
pub mod topics {
    /// Subscribe to this to receive every topic.
    pub const ALL: &str = "*";

    pub const JOB_QUEUED: &str = "job.queued";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_PROGRESS: &str = "job.progress";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_CANCELLED: &str = "job.cancelled";
    pub const JOB_REMOVED: &str = "job.removed";
    pub const QUEUE_DRAINED: &str = "queue.drained";

    pub const TASK_REGISTERED: &str = "task.registered";
    pub const TASK_UPDATED: &str = "task.updated";
    pub const TASK_FINISHED: &str = "task.finished";
    pub const TASK_PURGED: &str = "task.purged";

    pub const ENTITY_REGISTERED: &str = "entity.registered";
    pub const ENTITY_UPDATED: &str = "entity.updated";
    pub const ENTITY_REMOVED: &str = "entity.removed";

    pub const SELECTION_CHANGED: &str = "selection.changed";
    pub const STATS_CHANGED: &str = "stats.changed";

    pub const CUSTOM: &str = "custom";
}

/// Payload describing what happened.
///
/// Every variant carries an owned snapshot, so handlers never observe a
/// record that is still being mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Job lifecycle -------------------------------------------------------
    JobQueued {
        job: Job,
    },
    JobStarted {
        job: Job,
    },
    JobProgress {
        job: Job,
        progress: f32,
    },
    JobCompleted {
        job: Job,
    },
    JobFailed {
        job: Job,
        error: String,
    },
    JobCancelled {
        job: Job,
    },
    JobRemoved {
        job: Job,
    },
    QueueDrained,

    // -- Tasks ---------------------------------------------------------------
    TaskRegistered {
        task: Task,
    },
    TaskUpdated {
        task: Task,
    },
    TaskFinished {
        task: Task,
    },
    TaskPurged {
        task_id: TaskId,
    },

    // -- Entities ------------------------------------------------------------
    EntityRegistered {
        entity: Entity,
    },
    EntityUpdated {
        entity: Entity,
    },
    EntityRemoved {
        entity_id: EntityId,
    },
    SelectionChanged {
        selected: Vec<EntityId>,
    },
    StatsChanged {
        stats: StatsSnapshot,
    },

    /// Free-form payload for collaborators publishing their own topics.
    Custom {
        data: serde_json::Value,
    },
}

impl EventPayload {
    /// The topic this payload is published under by default.
    pub fn topic(&self) -> &'static str {
        match self {
            EventPayload::JobQueued { .. } => topics::JOB_QUEUED,
            EventPayload::JobStarted { .. } => topics::JOB_STARTED,
            EventPayload::JobProgress { .. } => topics::JOB_PROGRESS,
            EventPayload::JobCompleted { .. } => topics::JOB_COMPLETED,
            EventPayload::JobFailed { .. } => topics::JOB_FAILED,
            EventPayload::JobCancelled { .. } => topics::JOB_CANCELLED,
            EventPayload::JobRemoved { .. } => topics::JOB_REMOVED,
            EventPayload::QueueDrained => topics::QUEUE_DRAINED,
            EventPayload::TaskRegistered { .. } => topics::TASK_REGISTERED,
            EventPayload::TaskUpdated { .. } => topics::TASK_UPDATED,
            EventPayload::TaskFinished { .. } => topics::TASK_FINISHED,
            EventPayload::TaskPurged { .. } => topics::TASK_PURGED,
            EventPayload::EntityRegistered { .. } => topics::ENTITY_REGISTERED,
            EventPayload::EntityUpdated { .. } => topics::ENTITY_UPDATED,
            EventPayload::EntityRemoved { .. } => topics::ENTITY_REMOVED,
            EventPayload::SelectionChanged { .. } => topics::SELECTION_CHANGED,
            EventPayload::StatsChanged { .. } => topics::STATS_CHANGED,
            EventPayload::Custom { .. } => topics::CUSTOM,
        }
    }

    /// The job snapshot carried by job lifecycle payloads.
    pub fn job(&self) -> Option<&Job> {
        match self {
            EventPayload::JobQueued { job }
            | EventPayload::JobStarted { job }
            | EventPayload::JobProgress { job, .. }
            | EventPayload::JobCompleted { job }
            | EventPayload::JobFailed { job, .. }
            | EventPayload::JobCancelled { job }
            | EventPayload::JobRemoved { job } => Some(job),
            _ => None,
        }
    }
}

/// A timestamped event as delivered to handlers and stream receivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
    /// Topic it was published under.
    pub topic: String,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(topic: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }
}
