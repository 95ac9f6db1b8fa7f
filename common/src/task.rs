use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataframe::DataFrame;
use crate::model::ModelId;
use crate::node::NodeId;

pub type TaskId = String;

/// Fresh random task id.
pub fn new_task_id() -> TaskId {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Prediction,
    Training,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Legal moves: CREATED -> RUNNING, and any non-terminal state to a
    /// terminal one. Nothing leaves a terminal state and nothing repeats.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        match (self, next) {
            (TaskState::Created, TaskState::Running) => true,
            (TaskState::Created | TaskState::Running, TaskState::Completed | TaskState::Failed) => {
                true
            }
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Created => "CREATED",
            TaskState::Running => "RUNNING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputDataType {
    DataFrame,
    SearchQuery,
}

/// One tracked unit of ML work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlTask {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub function_name: String,
    pub input_type: InputDataType,
    pub state: TaskState,
    /// Node executing the task; fixed at creation.
    pub worker_node: NodeId,
    pub model_id: Option<ModelId>,
    pub create_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    #[serde(rename = "async")]
    pub is_async: bool,
    /// Failure reason, set when the task ends FAILED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Output of a completed prediction, kept so async callers can poll it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_result: Option<DataFrame>,
}

impl MlTask {
    /// Builds a task in the CREATED state with a freshly generated id.
    pub fn new(
        task_type: TaskType,
        function_name: impl Into<String>,
        input_type: InputDataType,
        worker_node: NodeId,
        model_id: Option<ModelId>,
        is_async: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: new_task_id(),
            task_type,
            function_name: function_name.into(),
            input_type,
            state: TaskState::Created,
            worker_node,
            model_id,
            create_time: now,
            last_update_time: now,
            is_async,
            error: None,
            prediction_result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        for next in [
            TaskState::Created,
            TaskState::Running,
            TaskState::Completed,
            TaskState::Failed,
        ] {
            assert!(!TaskState::Completed.can_transition_to(next));
            assert!(!TaskState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn nothing_returns_to_created_or_repeats() {
        assert!(!TaskState::Running.can_transition_to(TaskState::Created));
        assert!(!TaskState::Running.can_transition_to(TaskState::Running));
        assert!(!TaskState::Created.can_transition_to(TaskState::Created));
    }

    #[test]
    fn created_can_fail_without_running() {
        assert!(TaskState::Created.can_transition_to(TaskState::Failed));
        assert!(TaskState::Created.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Completed));
    }

    #[test]
    fn new_task_starts_created_with_unique_id() {
        let a = MlTask::new(
            TaskType::Prediction,
            "kmeans",
            InputDataType::DataFrame,
            "node-a".to_string(),
            Some("m1".to_string()),
            false,
        );
        let b = MlTask::new(
            TaskType::Prediction,
            "kmeans",
            InputDataType::DataFrame,
            "node-a".to_string(),
            None,
            false,
        );

        assert_eq!(a.state, TaskState::Created);
        assert_ne!(a.task_id, b.task_id);
        assert_eq!(a.create_time, a.last_update_time);
    }
}
