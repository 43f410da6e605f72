//! Shared task and entity state.
//!
//! [`StateStore`] is the single source of truth for the status of tracked
//! work. All collections sit behind one store-wide `RwLock`; readers get
//! owned snapshots. Every mutation publishes an event on the injected
//! [`EventBus`] once the lock has been released, so handlers are free to
//! call back into the store. The flip side is that two threads mutating at
//! once may publish in either order; [`StatsSnapshot::revision`] tells a
//! stale `stats.changed` payload from a fresh one.

mod types;

pub use types::*;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use tagforged_common::{EntityId, Error, Result, TaskId};

use crate::events::{EventBus, EventPayload};

#[derive(Default)]
struct StoreInner {
    tasks: HashMap<TaskId, Task>,
    entities: HashMap<EntityId, Entity>,
    selection: Vec<EntityId>,
    stats: StatsSnapshot,
}

pub struct StateStore {
    inner: RwLock<StoreInner>,
    events: Arc<EventBus>,
}

impl StateStore {
    pub fn new(events: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(StoreInner::default()),
            events,
        })
    }

    /// The bus this store publishes on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    fn publish_all(&self, payloads: Vec<EventPayload>) {
        for payload in payloads {
            self.events.emit(payload);
        }
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Add a task and count it in `total`.
    pub fn register_task(&self, task: Task) -> Result<TaskId> {
        let id = task.id;
        let stats = {
            let mut inner = self.inner.write();
            if inner.tasks.contains_key(&id) {
                return Err(Error::Conflict(format!("task {id} already registered")));
            }
            inner.tasks.insert(id, task.clone());
            inner.stats.total += 1;
            inner.stats.revision += 1;
            inner.stats.clone()
        };

        tracing::debug!("Registered task {} for {:?}", id, task.subject_path);
        self.publish_all(vec![
            EventPayload::TaskRegistered { task },
            EventPayload::StatsChanged { stats },
        ]);
        Ok(id)
    }

    /// Apply a partial update to an unfinished task.
    ///
    /// Terminal statuses must go through [`finish_task`](Self::finish_task).
    pub fn update_task(&self, id: TaskId, update: TaskUpdate) -> Result<Task> {
        if update.status.is_some_and(|s| s.is_terminal()) {
            return Err(Error::invalid_transition(
                "use finish_task to move a task to a terminal status",
            ));
        }

        let task = {
            let mut inner = self.inner.write();
            let task = inner
                .tasks
                .get_mut(&id)
                .ok_or_else(|| Error::not_found("task", id))?;
            if task.is_finished() {
                return Err(Error::invalid_transition(format!(
                    "task {id} is already {}",
                    task.status
                )));
            }
            task.apply(update);
            task.clone()
        };

        self.events.emit(EventPayload::TaskUpdated { task: task.clone() });
        Ok(task)
    }

    /// Move a task to a terminal status and bump the matching counter.
    pub fn finish_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> Result<Task> {
        if !status.is_terminal() {
            return Err(Error::invalid_transition(format!(
                "{status} is not a terminal status"
            )));
        }

        let (task, stats) = {
            let mut inner = self.inner.write();
            let task = inner
                .tasks
                .get_mut(&id)
                .ok_or_else(|| Error::not_found("task", id))?;
            if task.is_finished() {
                return Err(Error::invalid_transition(format!(
                    "task {id} is already {}",
                    task.status
                )));
            }
            task.finish(status, error_message);
            let task = task.clone();
            inner.stats.record_finish(status);
            inner.stats.revision += 1;
            (task, inner.stats.clone())
        };

        tracing::debug!("Task {} finished: {}", id, status);
        self.publish_all(vec![
            EventPayload::TaskFinished { task: task.clone() },
            EventPayload::StatsChanged { stats },
        ]);
        Ok(task)
    }

    pub fn get_task(&self, id: TaskId) -> Option<Task> {
        self.inner.read().tasks.get(&id).cloned()
    }

    /// All tasks in registration order.
    pub fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.inner.read().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));
        tasks
    }

    pub fn list_tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.list_tasks()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    /// Forget a finished task. Counters are not affected.
    pub fn purge_task(&self, id: TaskId) -> Result<Task> {
        let task = {
            let mut inner = self.inner.write();
            match inner.tasks.get(&id) {
                None => return Err(Error::not_found("task", id)),
                Some(task) if !task.is_finished() => {
                    return Err(Error::invalid_transition(format!(
                        "task {id} is still {}",
                        task.status
                    )));
                }
                Some(_) => {}
            }
            inner
                .tasks
                .remove(&id)
                .ok_or_else(|| Error::not_found("task", id))?
        };

        self.events.emit(EventPayload::TaskPurged { task_id: id });
        Ok(task)
    }

    /// Forget every finished task. Returns how many were removed.
    pub fn purge_finished_tasks(&self) -> usize {
        let purged: Vec<TaskId> = {
            let mut inner = self.inner.write();
            let ids: Vec<TaskId> = inner
                .tasks
                .values()
                .filter(|t| t.is_finished())
                .map(|t| t.id)
                .collect();
            for id in &ids {
                inner.tasks.remove(id);
            }
            ids
        };

        let count = purged.len();
        self.publish_all(
            purged
                .into_iter()
                .map(|task_id| EventPayload::TaskPurged { task_id })
                .collect(),
        );
        count
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn register_entity(&self, entity: Entity) -> Result<EntityId> {
        let id = entity.id;
        {
            let mut inner = self.inner.write();
            if inner.entities.contains_key(&id) {
                return Err(Error::Conflict(format!("entity {id} already registered")));
            }
            inner.entities.insert(id, entity.clone());
        }

        self.events.emit(EventPayload::EntityRegistered { entity });
        Ok(id)
    }

    pub fn update_entity(&self, id: EntityId, update: EntityUpdate) -> Result<Entity> {
        let entity = {
            let mut inner = self.inner.write();
            let entity = inner
                .entities
                .get_mut(&id)
                .ok_or_else(|| Error::not_found("entity", id))?;
            entity.apply(update);
            entity.clone()
        };

        self.events.emit(EventPayload::EntityUpdated {
            entity: entity.clone(),
        });
        Ok(entity)
    }

    /// Remove an entity, dropping it from the selection too.
    pub fn remove_entity(&self, id: EntityId) -> Result<Entity> {
        let (entity, selection) = {
            let mut inner = self.inner.write();
            let entity = inner
                .entities
                .remove(&id)
                .ok_or_else(|| Error::not_found("entity", id))?;
            let before = inner.selection.len();
            inner.selection.retain(|s| *s != id);
            let selection = (inner.selection.len() != before).then(|| inner.selection.clone());
            (entity, selection)
        };

        let mut payloads = vec![EventPayload::EntityRemoved { entity_id: id }];
        if let Some(selected) = selection {
            payloads.push(EventPayload::SelectionChanged { selected });
        }
        self.publish_all(payloads);
        Ok(entity)
    }

    pub fn get_entity(&self, id: EntityId) -> Option<Entity> {
        self.inner.read().entities.get(&id).cloned()
    }

    /// Entities with `status`, sorted by name.
    pub fn list_entities_by_status(&self, status: TaskStatus) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .inner
            .read()
            .entities
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        entities
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Add an entity to the selection. Returns false if already selected.
    pub fn select(&self, id: EntityId) -> Result<bool> {
        let selected = {
            let mut inner = self.inner.write();
            if !inner.entities.contains_key(&id) {
                return Err(Error::not_found("entity", id));
            }
            if inner.selection.contains(&id) {
                return Ok(false);
            }
            inner.selection.push(id);
            inner.selection.clone()
        };

        self.events.emit(EventPayload::SelectionChanged { selected });
        Ok(true)
    }

    /// Remove an entity from the selection. Returns false if it was not
    /// selected.
    pub fn deselect(&self, id: EntityId) -> bool {
        let selected = {
            let mut inner = self.inner.write();
            let before = inner.selection.len();
            inner.selection.retain(|s| *s != id);
            if inner.selection.len() == before {
                return false;
            }
            inner.selection.clone()
        };

        self.events.emit(EventPayload::SelectionChanged { selected });
        true
    }

    /// Empty the selection. Returns how many entities were deselected.
    pub fn clear_selection(&self) -> usize {
        let cleared = {
            let mut inner = self.inner.write();
            std::mem::take(&mut inner.selection).len()
        };

        if cleared > 0 {
            self.events.emit(EventPayload::SelectionChanged {
                selected: Vec::new(),
            });
        }
        cleared
    }

    /// Selected entity ids, in selection order.
    pub fn list_selected(&self) -> Vec<EntityId> {
        self.inner.read().selection.clone()
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.read().stats.clone()
    }

    /// Add `delta` to a named counter and return its new value.
    pub fn increment_stat(&self, name: &str, delta: u64) -> u64 {
        let (value, stats) = {
            let mut inner = self.inner.write();
            let counter = inner.stats.counters.entry(name.to_string()).or_insert(0);
            *counter = counter.saturating_add(delta);
            let value = *counter;
            inner.stats.revision += 1;
            (value, inner.stats.clone())
        };

        self.events.emit(EventPayload::StatsChanged { stats });
        value
    }

    /// Zero every counter, including named ones.
    pub fn reset_stats(&self) {
        let stats = {
            let mut inner = self.inner.write();
            let revision = inner.stats.revision + 1;
            inner.stats = StatsSnapshot {
                revision,
                ..StatsSnapshot::default()
            };
            inner.stats.clone()
        };

        tracing::info!("Statistics reset");
        self.events.emit(EventPayload::StatsChanged { stats });
    }
}
