use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use common::{DataFrame, MlError, MlResult, MlTask, ModelId, TaskId, TaskState};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 1024;

/// Published on every accepted state change, including registration.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStateChange {
    pub task_id: TaskId,
    pub state: TaskState,
    pub at: DateTime<Utc>,
}

/// Authoritative registry of the tasks running on this node.
///
/// Only the task manager mutates a task's state; it refuses any transition the
/// state machine does not allow, which is how late callbacks for a finished
/// task end up ignored instead of applied.
pub struct TaskManager {
    tasks: Mutex<HashMap<TaskId, MlTask>>,
    max_running_tasks: usize,
    events: broadcast::Sender<TaskStateChange>,
}

impl TaskManager {
    pub fn new(max_running_tasks: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tasks: Mutex::new(HashMap::new()),
            max_running_tasks,
            events,
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, MlTask>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskStateChange> {
        self.events.subscribe()
    }

    fn publish(&self, task_id: &str, state: TaskState, at: DateTime<Utc>) {
        // no receivers is fine
        let _ = self.events.send(TaskStateChange {
            task_id: task_id.to_string(),
            state,
            at,
        });
    }

    /// Registers a CREATED task.
    pub fn add(&self, task: MlTask) -> MlResult<()> {
        if task.state != TaskState::Created {
            return Err(MlError::Internal(format!(
                "task {} registered in state {}",
                task.task_id,
                task.state.as_str()
            )));
        }

        let mut tasks = self.tasks();
        if tasks.contains_key(&task.task_id) {
            return Err(MlError::Internal(format!(
                "Duplicate taskId: {}",
                task.task_id
            )));
        }
        if tasks.len() >= self.max_running_tasks {
            return Err(MlError::ResourceExhausted(
                "exceed max running task limit".to_string(),
            ));
        }

        debug!(task_id = %task.task_id, function = %task.function_name, "task registered");
        self.publish(&task.task_id, task.state, task.create_time);
        tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    /// Moves a task to `state`. Returns `false`, and leaves the task alone,
    /// when the task is unknown or the transition is not allowed.
    pub fn update_task_state(&self, task_id: &str, state: TaskState, error: Option<String>) -> bool {
        let mut tasks = self.tasks();
        let Some(task) = tasks.get_mut(task_id) else {
            warn!(task_id, state = state.as_str(), "state change for unknown task ignored");
            return false;
        };

        if !task.state.can_transition_to(state) {
            warn!(
                task_id,
                from = task.state.as_str(),
                to = state.as_str(),
                "illegal task state transition ignored"
            );
            return false;
        }

        let now = Utc::now();
        task.state = state;
        task.last_update_time = now;
        if error.is_some() {
            task.error = error;
        }
        self.publish(task_id, state, now);
        true
    }

    pub fn set_model_id(&self, task_id: &str, model_id: ModelId) -> bool {
        match self.tasks().get_mut(task_id) {
            Some(task) => {
                task.model_id = Some(model_id);
                true
            }
            None => false,
        }
    }

    pub fn set_prediction_result(&self, task_id: &str, result: DataFrame) -> bool {
        match self.tasks().get_mut(task_id) {
            Some(task) => {
                task.prediction_result = Some(result);
                true
            }
            None => false,
        }
    }

    pub fn get_task(&self, task_id: &str) -> Option<MlTask> {
        self.tasks().get(task_id).cloned()
    }

    pub fn remove_task(&self, task_id: &str) -> Option<MlTask> {
        let removed = self.tasks().remove(task_id);
        if removed.is_none() {
            warn!(task_id, "remove of unknown task ignored");
        }
        removed
    }

    pub fn running_task_count(&self) -> usize {
        self.tasks().len()
    }
}
