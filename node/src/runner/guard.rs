use std::sync::Arc;

use common::{MlError, MlOutput, MlResult, MlTask, TaskState};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::stats::{
    failure_count_stat, request_count_stat, ActionName, MlStats, ML_EXECUTING_TASK_COUNT,
    ML_TOTAL_FAILURE_COUNT, ML_TOTAL_REQUEST_COUNT,
};
use crate::store::TaskStore;
use crate::task_manager::TaskManager;

/// Bumps the per-function and the total failure counters.
pub(crate) fn count_failure(stats: &MlStats, function_name: &str, action: ActionName) {
    stats
        .create_counter_stat_if_absent(&failure_count_stat(function_name, action))
        .increment();
    stats
        .create_counter_stat_if_absent(ML_TOTAL_FAILURE_COUNT)
        .increment();
}

/// Ownership of one registered task.
///
/// `finish` consumes the guard, so a task gets at most one terminal
/// transition and one cleanup. A guard dropped without finishing (panic,
/// caller went away) fails the task on the way out.
pub(crate) struct TaskGuard {
    manager: Arc<TaskManager>,
    stats: Arc<MlStats>,
    tasks: Arc<dyn TaskStore>,
    task_id: String,
    function_name: String,
    action: ActionName,
    is_async: bool,
    done: bool,
}

impl TaskGuard {
    /// Adds `task` to the registry and accounts for it in the stats.
    pub(crate) fn register(
        manager: Arc<TaskManager>,
        stats: Arc<MlStats>,
        tasks: Arc<dyn TaskStore>,
        task: MlTask,
        action: ActionName,
    ) -> MlResult<TaskGuard> {
        let task_id = task.task_id.clone();
        let function_name = task.function_name.clone();
        let is_async = task.is_async;

        if let Err(e) = manager.add(task) {
            if e.counts_as_failure() {
                count_failure(&stats, &function_name, action);
            }
            return Err(e);
        }

        stats
            .create_counter_stat_if_absent(ML_EXECUTING_TASK_COUNT)
            .increment();
        stats
            .create_counter_stat_if_absent(ML_TOTAL_REQUEST_COUNT)
            .increment();
        stats
            .create_counter_stat_if_absent(&request_count_stat(&function_name, action))
            .increment();

        Ok(TaskGuard {
            manager,
            stats,
            tasks,
            task_id,
            function_name,
            action,
            is_async,
            done: false,
        })
    }

    pub(crate) fn task_id(&self) -> &str {
        &self.task_id
    }

    pub(crate) fn mark_running(&self) {
        self.manager
            .update_task_state(&self.task_id, TaskState::Running, None);
    }

    /// Terminal transition, persistence, cleanup and delivery of `result`,
    /// in that order. An async task stays visible in the registry until its
    /// final record is stored.
    pub(crate) async fn finish(mut self, result: MlResult<MlOutput>) -> MlResult<MlOutput> {
        match &result {
            Ok(output) => {
                match output {
                    MlOutput::Training { model_id, .. } => {
                        self.manager.set_model_id(&self.task_id, model_id.clone());
                    }
                    MlOutput::Prediction {
                        prediction_result, ..
                    } if self.is_async => {
                        self.manager
                            .set_prediction_result(&self.task_id, prediction_result.clone());
                    }
                    _ => {}
                }
                self.manager
                    .update_task_state(&self.task_id, TaskState::Completed, None);
                debug!(task_id = %self.task_id, "task completed");
            }
            Err(e) => {
                self.record_failure(e);
            }
        }

        self.done = true;
        if let Some(record) = self.final_record() {
            persist(self.tasks.as_ref(), &record).await;
        }
        release(&self.manager, &self.stats, &self.task_id);
        result
    }

    fn record_failure(&self, e: &MlError) {
        self.manager
            .update_task_state(&self.task_id, TaskState::Failed, Some(e.to_string()));
        if e.counts_as_failure() {
            count_failure(&self.stats, &self.function_name, self.action);
        }
        warn!(task_id = %self.task_id, function = %self.function_name, error = %e, "task failed");
    }

    /// Snapshot of the terminal record, for async tasks only.
    fn final_record(&self) -> Option<MlTask> {
        if !self.is_async {
            return None;
        }
        self.manager.get_task(&self.task_id)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.record_failure(&MlError::Internal(
            "task abandoned before finishing".to_string(),
        ));

        let record = self.final_record();
        let handle = Handle::try_current();
        match (record, handle) {
            (Some(record), Ok(handle)) => {
                let manager = self.manager.clone();
                let stats = self.stats.clone();
                let tasks = self.tasks.clone();
                let task_id = self.task_id.clone();
                handle.spawn(async move {
                    persist(tasks.as_ref(), &record).await;
                    release(&manager, &stats, &task_id);
                });
            }
            (Some(_), Err(_)) => {
                warn!(task_id = %self.task_id, "no runtime left to persist task");
                release(&self.manager, &self.stats, &self.task_id);
            }
            (None, _) => release(&self.manager, &self.stats, &self.task_id),
        }
    }
}

/// Decrements the executing count and drops the task from the registry.
fn release(manager: &TaskManager, stats: &MlStats, task_id: &str) {
    if let Some(counter) = stats.get_stat(ML_EXECUTING_TASK_COUNT) {
        counter.decrement();
    }
    manager.remove_task(task_id);
}

async fn persist(tasks: &dyn TaskStore, record: &MlTask) {
    if let Err(e) = tasks.put(record).await {
        warn!(task_id = %record.task_id, error = %e, "cannot persist final task record");
    }
}
