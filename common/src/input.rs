use serde::{Deserialize, Serialize};

use crate::dataframe::DataFrame;
use crate::task::InputDataType;

/// Where the rows of a task come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputDataset {
    /// Rows shipped inline with the request.
    DataFrame { data_frame: DataFrame },
    /// Rows to be fetched from one or more indices before running.
    SearchQuery {
        indices: Vec<String>,
        #[serde(default)]
        columns: Option<Vec<String>>,
        #[serde(default)]
        size: Option<usize>,
    },
}

impl InputDataset {
    pub fn data_type(&self) -> InputDataType {
        match self {
            InputDataset::DataFrame { .. } => InputDataType::DataFrame,
            InputDataset::SearchQuery { .. } => InputDataType::SearchQuery,
        }
    }
}

/// Algorithm invocation: which function, its parameters and its data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlInput {
    pub function_name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub input_dataset: InputDataset,
}

impl MlInput {
    /// Same invocation, with its dataset replaced by an already resolved frame.
    pub fn with_data_frame(&self, data_frame: DataFrame) -> MlInput {
        MlInput {
            function_name: self.function_name.clone(),
            parameters: self.parameters.clone(),
            input_dataset: InputDataset::DataFrame { data_frame },
        }
    }

    /// The inline frame, if the dataset is one.
    pub fn data_frame(&self) -> Option<&DataFrame> {
        match &self.input_dataset {
            InputDataset::DataFrame { data_frame } => Some(data_frame),
            InputDataset::SearchQuery { .. } => None,
        }
    }
}
