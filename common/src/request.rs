use serde::{Deserialize, Serialize};

use crate::error::{MlError, MlResult};
use crate::input::{InputDataset, MlInput};
use crate::model::ModelId;
use crate::task::TaskType;
use crate::user::User;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionTaskRequest {
    pub input: MlInput,
    pub model_id: Option<ModelId>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    /// Caller identity; `None` when security is disabled.
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingTaskRequest {
    pub input: MlInput,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub user: Option<User>,
}

/// Body accepted by the public `_predict` / `_train` routes. The algorithm and
/// model id come from the path, the user from the `x-ml-user` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskBody {
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub input_dataset: InputDataset,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

/// A task request as forwarded between nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TaskRequest {
    Predict(PredictionTaskRequest),
    Train(TrainingTaskRequest),
}

impl TaskRequest {
    /// Name of the remote runner endpoint handling this request.
    pub fn action_name(&self) -> &'static str {
        match self {
            TaskRequest::Predict(_) => "predict",
            TaskRequest::Train(_) => "train",
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskRequest::Predict(_) => TaskType::Prediction,
            TaskRequest::Train(_) => TaskType::Training,
        }
    }

    pub fn input(&self) -> &MlInput {
        match self {
            TaskRequest::Predict(r) => &r.input,
            TaskRequest::Train(r) => &r.input,
        }
    }

    pub fn is_async(&self) -> bool {
        match self {
            TaskRequest::Predict(r) => r.is_async,
            TaskRequest::Train(r) => r.is_async,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            TaskRequest::Predict(r) => r.user.as_ref(),
            TaskRequest::Train(r) => r.user.as_ref(),
        }
    }

    /// Shape checks that need no I/O.
    pub fn validate(&self) -> MlResult<()> {
        validate_input(self.input())
    }
}

fn validate_input(input: &MlInput) -> MlResult<()> {
    if input.function_name.trim().is_empty() {
        return Err(MlError::InvalidArgument(
            "ML input can't be null".to_string(),
        ));
    }
    match &input.input_dataset {
        InputDataset::SearchQuery { indices, .. } if indices.is_empty() => Err(
            MlError::InvalidArgument("input data can't be null".to_string()),
        ),
        InputDataset::SearchQuery { .. } => Ok(()),
        InputDataset::DataFrame { data_frame } => data_frame.check_shape(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataframe::DataFrame;
    use assert_matches::assert_matches;

    fn input(function_name: &str, dataset: InputDataset) -> MlInput {
        MlInput {
            function_name: function_name.to_string(),
            parameters: serde_json::Value::Null,
            input_dataset: dataset,
        }
    }

    #[test]
    fn action_names() {
        let frame = InputDataset::DataFrame {
            data_frame: DataFrame::default(),
        };
        let predict = TaskRequest::Predict(PredictionTaskRequest {
            input: input("kmeans", frame.clone()),
            model_id: None,
            is_async: false,
            user: None,
        });
        let train = TaskRequest::Train(TrainingTaskRequest {
            input: input("kmeans", frame),
            is_async: true,
            user: None,
        });

        assert_eq!(predict.action_name(), "predict");
        assert_eq!(train.action_name(), "train");
        assert!(train.is_async());
        assert_eq!(predict.task_type(), TaskType::Prediction);
    }

    #[test]
    fn validation_rejects_missing_pieces() {
        let no_fn = TaskRequest::Train(TrainingTaskRequest {
            input: input(
                " ",
                InputDataset::DataFrame {
                    data_frame: DataFrame::default(),
                },
            ),
            is_async: false,
            user: None,
        });
        assert_matches!(no_fn.validate(), Err(MlError::InvalidArgument(m)) if m == "ML input can't be null");

        let no_indices = TaskRequest::Train(TrainingTaskRequest {
            input: input(
                "kmeans",
                InputDataset::SearchQuery {
                    indices: vec![],
                    columns: None,
                    size: None,
                },
            ),
            is_async: false,
            user: None,
        });
        assert_matches!(no_indices.validate(), Err(MlError::InvalidArgument(m)) if m == "input data can't be null");
    }

    #[test]
    fn ragged_frame_from_the_wire_is_rejected() {
        let raw = r#"{
            "action": "predict",
            "input": {
                "function_name": "kmeans",
                "input_dataset": {
                    "type": "data_frame",
                    "data_frame": { "columns": ["a", "b"], "rows": [[1.0, 2.0], [3.0]] }
                }
            },
            "model_id": "m1"
        }"#;
        let req: TaskRequest = serde_json::from_str(raw).unwrap();
        assert_matches!(
            req.validate(),
            Err(MlError::InvalidArgument(m)) if m == "row 1 has 1 values but the frame has 2 columns"
        );
    }

    #[test]
    fn forwarded_request_is_tagged_by_action() {
        let req = TaskRequest::Predict(PredictionTaskRequest {
            input: input(
                "kmeans",
                InputDataset::SearchQuery {
                    indices: vec!["iris".into()],
                    columns: None,
                    size: Some(10),
                },
            ),
            model_id: Some("m1".into()),
            is_async: false,
            user: Some(User::new("alice")),
        });
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["action"], "predict");
        assert_eq!(json["model_id"], "m1");

        let back: TaskRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }
}
