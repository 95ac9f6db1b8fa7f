use serde::{Deserialize, Serialize};

use crate::dataframe::DataFrame;
use crate::model::ModelId;
use crate::task::{TaskId, TaskState};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MlOutput {
    Prediction {
        task_id: TaskId,
        status: TaskState,
        prediction_result: DataFrame,
    },
    Training {
        task_id: TaskId,
        model_id: ModelId,
        status: TaskState,
    },
    /// Returned right away for async submissions; poll the task id.
    AsyncTask { task_id: TaskId, status: TaskState },
}

impl MlOutput {
    pub fn task_id(&self) -> &str {
        match self {
            MlOutput::Prediction { task_id, .. }
            | MlOutput::Training { task_id, .. }
            | MlOutput::AsyncTask { task_id, .. } => task_id,
        }
    }

    pub fn status(&self) -> TaskState {
        match self {
            MlOutput::Prediction { status, .. }
            | MlOutput::Training { status, .. }
            | MlOutput::AsyncTask { status, .. } => *status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResponse {
    pub output: MlOutput,
}

impl From<MlOutput> for TaskResponse {
    fn from(output: MlOutput) -> Self {
        Self { output }
    }
}
