//! Registry of ingestion task state.
//!
//! Each task is written only by the worker that owns it; everything else
//! reads snapshots. Terminal states are immutable.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use vellum_core::types::{IngestionTask, KbId, TaskId, TaskState};

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, IngestionTask>>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending task and hand back its id.
    pub fn register(&self, filename: impl Into<String>, kb_id: KbId) -> TaskId {
        let id = TaskId::generate();
        let task = IngestionTask {
            id,
            filename: filename.into(),
            kb_id,
            state: TaskState::Pending,
            created_at: Utc::now(),
        };
        self.write_lock().insert(id, task);
        id
    }

    /// Snapshot of one task, if it exists.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<IngestionTask> {
        self.read_lock().get(&id).cloned()
    }

    /// Snapshots of every known task, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<IngestionTask> {
        let mut tasks: Vec<IngestionTask> = self.read_lock().values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Move a task to a new state. Transitions out of a terminal state are
    /// refused.
    pub(crate) fn transition(&self, id: TaskId, state: TaskState) {
        let mut tasks = self.write_lock();
        match tasks.get_mut(&id) {
            Some(task) if task.state.is_terminal() => {
                tracing::warn!(%id, ?state, "ignoring transition out of terminal task state");
            }
            Some(task) => task.state = state,
            None => tracing::warn!(%id, "transition for unknown task"),
        }
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TaskId, IngestionTask>> {
        self.tasks.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskId, IngestionTask>> {
        self.tasks.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_starts_pending() {
        let registry = TaskRegistry::new();
        let id = registry.register("a.pdf", KbId::default_kb());
        let task = registry.get(id).unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.filename, "a.pdf");
    }

    #[test]
    fn unknown_task_is_none() {
        let registry = TaskRegistry::new();
        assert!(registry.get(TaskId::generate()).is_none());
    }

    #[test]
    fn normal_lifecycle() {
        let registry = TaskRegistry::new();
        let id = registry.register("a.pdf", KbId::default_kb());
        registry.transition(id, TaskState::Processing);
        assert_eq!(registry.get(id).unwrap().state, TaskState::Processing);
        registry.transition(id, TaskState::Completed { chunks: 12 });
        assert_eq!(
            registry.get(id).unwrap().state,
            TaskState::Completed { chunks: 12 }
        );
    }

    #[test]
    fn terminal_states_are_immutable() {
        let registry = TaskRegistry::new();
        let id = registry.register("a.pdf", KbId::default_kb());
        registry.transition(
            id,
            TaskState::Failed {
                error: "embedding failed".into(),
            },
        );
        registry.transition(id, TaskState::Processing);
        assert!(matches!(
            registry.get(id).unwrap().state,
            TaskState::Failed { .. }
        ));
    }

    #[test]
    fn list_is_newest_first() {
        let registry = TaskRegistry::new();
        let first = registry.register("one.pdf", KbId::default_kb());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = registry.register("two.pdf", KbId::default_kb());
        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second);
        assert_eq!(listed[1].id, first);
    }

    #[test]
    fn concurrent_reads_while_writer_mutates() {
        use std::sync::Arc;

        let registry = Arc::new(TaskRegistry::new());
        let id = registry.register("big.pdf", KbId::default_kb());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let _ = registry.get(id);
                    }
                })
            })
            .collect();

        registry.transition(id, TaskState::Processing);
        registry.transition(id, TaskState::Completed { chunks: 1 });

        for handle in readers {
            handle.join().unwrap();
        }
        assert!(registry.get(id).unwrap().state.is_terminal());
    }
}
