use common::{MlError, MlOutput, MlResult, PredictionTaskRequest, TaskState};
use tracing::debug;

use super::guard::TaskGuard;
use super::TaskRunner;

/// model id -> input -> model -> access check -> RUNNING -> engine.
pub(super) async fn run(
    runner: &TaskRunner,
    guard: &TaskGuard,
    request: PredictionTaskRequest,
) -> MlResult<MlOutput> {
    // 1) a prediction needs a model
    let model_id = request
        .model_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| MlError::InvalidArgument("ModelId is invalid".to_string()))?;

    // 2) rows
    let input = runner.resolve_input(&request.input).await?;

    // 3) model
    let model = runner.models.get(model_id).await?.ok_or_else(|| {
        MlError::NotFound("No model found, please check the modelId.".to_string())
    })?;

    // 4) caller vs owner
    let user = request.user.as_ref();
    if !runner.access.permitted(user, model.owner.as_ref()) {
        return Err(MlError::PermissionDenied(format!(
            "User: {} does not have permissions to run predict by model: {}",
            user.map(|u| u.name.as_str()).unwrap_or_default(),
            model_id
        )));
    }

    // 5) inference
    guard.mark_running();
    debug!(task_id = guard.task_id(), model_id, rows = input.data_frame().map(|f| f.len()), "running prediction");
    let engine = runner.engine.clone();
    let prediction = runner
        .run_on_pool(move || engine.predict(&input, &model))
        .await?;

    Ok(MlOutput::Prediction {
        task_id: guard.task_id().to_string(),
        status: TaskState::Completed,
        prediction_result: prediction,
    })
}
