use common::{MlOutput, MlResult, TaskState, TrainingTaskRequest};
use tracing::info;

use super::guard::TaskGuard;
use super::TaskRunner;
use crate::stats::ML_TOTAL_MODEL_COUNT;

pub(super) async fn run(
    runner: &TaskRunner,
    guard: &TaskGuard,
    request: TrainingTaskRequest,
) -> MlResult<MlOutput> {
    let input = runner.resolve_input(&request.input).await?;

    guard.mark_running();
    let engine = runner.engine.clone();
    let model = runner
        .run_on_pool(move || engine.train(&input))
        .await?
        .with_owner(request.user);

    // the new model belongs to whoever trained it
    runner.models.put(&model).await?;
    runner
        .stats
        .create_counter_stat_if_absent(ML_TOTAL_MODEL_COUNT)
        .increment();
    info!(task_id = guard.task_id(), model_id = %model.id, "model trained");

    Ok(MlOutput::Training {
        task_id: guard.task_id().to_string(),
        model_id: model.id,
        status: TaskState::Completed,
    })
}
