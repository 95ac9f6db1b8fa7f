//! Types shared by every process of the ML cluster: task records, models,
//! data frames, requests/responses exchanged between nodes and clients, the
//! error taxonomy and the engine interface.

pub mod dataframe;
pub mod engine;
pub mod error;
pub mod input;
pub mod model;
pub mod node;
pub mod request;
pub mod response;
pub mod task;
pub mod user;

pub use dataframe::DataFrame;
pub use engine::{BuiltinEngine, Engine};
pub use error::{MlError, MlResult};
pub use input::{InputDataset, MlInput};
pub use model::{Model, ModelId};
pub use node::{NodeId, NodeInfo, NodeMetrics, NodeStatsResponse, TaskGetResponse};
pub use request::{PredictionTaskRequest, SubmitTaskBody, TaskRequest, TrainingTaskRequest};
pub use response::{MlOutput, TaskResponse};
pub use task::{InputDataType, MlTask, TaskId, TaskState, TaskType};
pub use user::User;
