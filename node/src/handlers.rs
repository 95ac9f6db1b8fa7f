use std::time::SystemTime;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use common::{
    MlError, MlInput, MlResult, MlTask, NodeMetrics, NodeStatsResponse, PredictionTaskRequest,
    SubmitTaskBody, TaskGetResponse, TaskRequest, TaskResponse, TrainingTaskRequest, User,
};
use tower_http::trace::TraceLayer;

use crate::error::ApiResult;
use crate::state::AppState;

pub const USER_HEADER: &str = "x-ml-user";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // public surface
        .route("/api/v1/_predict/:algorithm", post(predict_without_model))
        .route("/api/v1/_predict/:algorithm/:model_id", post(predict_with_model))
        .route("/api/v1/_train/:algorithm", post(train))
        .route("/api/v1/tasks/:id", get(get_task))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/nodes", get(list_nodes))
        // node to node
        .route("/internal/predict", post(internal_predict))
        .route("/internal/train", post(internal_train))
        .route("/internal/stats", get(stats))
        .route("/internal/tasks/:id", get(internal_get_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- helpers ---------------- */

/// Requesting user from `x-ml-user`; no header means security is off.
fn user_from(headers: &HeaderMap) -> MlResult<Option<User>> {
    let Some(raw) = headers.get(USER_HEADER) else {
        return Ok(None);
    };
    let raw = raw
        .to_str()
        .map_err(|_| MlError::InvalidArgument(format!("invalid {} header", USER_HEADER)))?;
    User::parse(raw)
        .map(Some)
        .ok_or_else(|| MlError::InvalidArgument(format!("invalid {} header", USER_HEADER)))
}

fn ml_input(algorithm: String, body: SubmitTaskBody) -> MlInput {
    MlInput {
        function_name: algorithm,
        parameters: body.parameters,
        input_dataset: body.input_dataset,
    }
}

/* ---------------- public handlers ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn predict_without_model(
    State(state): State<AppState>,
    Path(algorithm): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SubmitTaskBody>,
) -> ApiResult<Json<TaskResponse>> {
    submit_prediction(state, algorithm, None, &headers, body).await
}

async fn predict_with_model(
    State(state): State<AppState>,
    Path((algorithm, model_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<SubmitTaskBody>,
) -> ApiResult<Json<TaskResponse>> {
    submit_prediction(state, algorithm, Some(model_id), &headers, body).await
}

async fn submit_prediction(
    state: AppState,
    algorithm: String,
    model_id: Option<String>,
    headers: &HeaderMap,
    body: SubmitTaskBody,
) -> ApiResult<Json<TaskResponse>> {
    let request = TaskRequest::Predict(PredictionTaskRequest {
        user: user_from(headers)?,
        is_async: body.is_async,
        model_id,
        input: ml_input(algorithm, body),
    });
    let output = state.runner.execute_task(request).await?;
    Ok(Json(output.into()))
}

async fn train(
    State(state): State<AppState>,
    Path(algorithm): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SubmitTaskBody>,
) -> ApiResult<Json<TaskResponse>> {
    let request = TaskRequest::Train(TrainingTaskRequest {
        user: user_from(&headers)?,
        is_async: body.is_async,
        input: ml_input(algorithm, body),
    });
    let output = state.runner.execute_task(request).await?;
    Ok(Json(output.into()))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MlTask>> {
    Ok(Json(state.runner.get_task(&id).await?))
}

async fn stats(State(state): State<AppState>) -> Json<NodeStatsResponse> {
    Json(state.runner.node_stats())
}

async fn list_nodes(State(state): State<AppState>) -> Json<Vec<NodeMetrics>> {
    Json(state.cluster.metrics(SystemTime::now()))
}

/* ---------------- internal handlers ---------------- */

async fn internal_predict(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    run_forwarded(state, "predict", request).await
}

async fn internal_train(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    run_forwarded(state, "train", request).await
}

async fn run_forwarded(
    state: AppState,
    endpoint: &str,
    request: TaskRequest,
) -> ApiResult<Json<TaskResponse>> {
    if request.action_name() != endpoint {
        return Err(MlError::InvalidArgument(format!(
            "{} request sent to /internal/{}",
            request.action_name(),
            endpoint
        ))
        .into());
    }
    let output = state.runner.run_local(request).await?;
    Ok(Json(output.into()))
}

async fn internal_get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskGetResponse>> {
    let task = state.runner.find_local_task(&id).await?;
    Ok(Json(TaskGetResponse { task }))
}
