//! Task runners: admission, dispatch and the local execution pipeline shared
//! by predictions and trainings.
//!
//! A request enters through [`TaskRunner::execute_task`] on whichever node
//! received it. After the breaker check the dispatcher picks a node; the local
//! node runs the request through [`TaskRunner::run_local`], a remote node gets
//! it over the [`Transport`] and runs the very same `run_local`.

mod guard;
mod predict;
mod train;

use std::sync::Arc;

use common::{
    Engine, MlError, MlInput, MlOutput, MlResult, MlTask, NodeStatsResponse, TaskRequest,
    TaskState,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::access::AccessControl;
use crate::breaker::CircuitBreakerService;
use crate::cluster::ClusterState;
use crate::dataset::DataResolver;
use crate::dispatcher::Dispatcher;
use crate::stats::{ActionName, MlStats, ML_EXECUTING_TASK_COUNT};
use crate::store::{ModelStore, TaskStore};
use crate::task_manager::TaskManager;
use crate::transport::Transport;

use guard::{count_failure, TaskGuard};

/// Everything a runner talks to.
pub struct RunnerParts {
    pub cluster: Arc<ClusterState>,
    pub manager: Arc<TaskManager>,
    pub stats: Arc<MlStats>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub breakers: CircuitBreakerService,
    pub transport: Arc<dyn Transport>,
    pub models: Arc<dyn ModelStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub data: Arc<dyn DataResolver>,
    pub engine: Arc<dyn Engine>,
    pub access: Arc<dyn AccessControl>,
    /// Engine calls allowed to run at once on this node.
    pub pool_size: usize,
}

#[derive(Clone)]
pub struct TaskRunner {
    cluster: Arc<ClusterState>,
    manager: Arc<TaskManager>,
    stats: Arc<MlStats>,
    dispatcher: Arc<dyn Dispatcher>,
    breakers: CircuitBreakerService,
    transport: Arc<dyn Transport>,
    models: Arc<dyn ModelStore>,
    tasks: Arc<dyn TaskStore>,
    data: Arc<dyn DataResolver>,
    engine: Arc<dyn Engine>,
    access: Arc<dyn AccessControl>,
    pool: Arc<Semaphore>,
}

fn action_of(request: &TaskRequest) -> ActionName {
    match request {
        TaskRequest::Predict(_) => ActionName::Predict,
        TaskRequest::Train(_) => ActionName::Train,
    }
}

fn breaker_open(name: &str) -> MlError {
    MlError::ResourceExhausted(format!(
        "{} circuit breaker is open, please check your resources!",
        name
    ))
}

impl TaskRunner {
    pub fn new(parts: RunnerParts) -> Self {
        Self {
            cluster: parts.cluster,
            manager: parts.manager,
            stats: parts.stats,
            dispatcher: parts.dispatcher,
            breakers: parts.breakers,
            transport: parts.transport,
            models: parts.models,
            tasks: parts.tasks,
            data: parts.data,
            engine: parts.engine,
            access: parts.access,
            pool: Arc::new(Semaphore::new(parts.pool_size.max(1))),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.cluster.local_node().id
    }

    pub fn stats(&self) -> &Arc<MlStats> {
        &self.stats
    }

    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// Shape checks, then the function name against the engine. Nothing is
    /// counted for a request rejected here.
    fn check(&self, request: &TaskRequest) -> MlResult<()> {
        request.validate()?;
        let function = &request.input().function_name;
        if !self.engine.supports(function) {
            return Err(MlError::InvalidArgument(format!(
                "unsupported algorithm: {}",
                function
            )));
        }
        Ok(())
    }

    /// Rejects the request when a breaker is open, counting the rejection as a
    /// failure of its function. Nothing is registered.
    fn admit(&self, request: &TaskRequest) -> MlResult<()> {
        if let Some(name) = self.breakers.check_open() {
            let function = &request.input().function_name;
            count_failure(&self.stats, function, action_of(request));
            warn!(function = %function, breaker = %name, "request rejected");
            return Err(breaker_open(&name));
        }
        Ok(())
    }

    fn register(&self, task: MlTask, action: ActionName) -> MlResult<TaskGuard> {
        TaskGuard::register(
            self.manager.clone(),
            self.stats.clone(),
            self.tasks.clone(),
            task,
            action,
        )
    }

    fn new_task(&self, request: &TaskRequest) -> MlTask {
        let model_id = match request {
            TaskRequest::Predict(r) => r.model_id.clone(),
            TaskRequest::Train(_) => None,
        };
        MlTask::new(
            request.task_type(),
            request.input().function_name.clone(),
            request.input().input_dataset.data_type(),
            self.node_id().to_string(),
            model_id,
            request.is_async(),
        )
    }

    /* ==================== entry points ==================== */

    /// Admission, node selection and local-or-remote execution.
    pub async fn execute_task(&self, request: TaskRequest) -> MlResult<MlOutput> {
        // 1) shape, function and breaker
        self.check(&request)?;
        self.admit(&request)?;

        // 2) pick a node
        let node = match self.dispatcher.dispatch_task().await {
            Ok(node) => node,
            Err(e) => return self.fail_undispatched(request, e).await,
        };

        // 3) run here or relay the remote answer as is
        if self.cluster.is_local(&node) {
            return self.run_local(request).await;
        }
        debug!(node = %node.id, action = request.action_name(), "forwarding to remote node");
        self.transport
            .send(&node, request)
            .await
            .map(|response| response.output)
    }

    /// A task nobody could take still gets a record, and it ends FAILED.
    async fn fail_undispatched(&self, request: TaskRequest, e: MlError) -> MlResult<MlOutput> {
        match self.register(self.new_task(&request), action_of(&request)) {
            Ok(guard) => guard.finish(Err(e)).await,
            Err(reg) => {
                warn!(error = %reg, "cannot record undispatched task");
                Err(e)
            }
        }
    }

    /// Runs `request` on this node. Remote nodes land here directly.
    pub async fn run_local(&self, request: TaskRequest) -> MlResult<MlOutput> {
        self.check(&request)?;
        self.admit(&request)?;

        let task = self.new_task(&request);
        let task_id = task.task_id.clone();
        let guard = self.register(task, action_of(&request))?;
        info!(
            task_id = %task_id,
            function = %request.input().function_name,
            action = request.action_name(),
            user = request.user().map(|u| u.name.as_str()).unwrap_or("-"),
            "task accepted"
        );

        if request.is_async() {
            let runner = self.clone();
            let spawned_id = task_id.clone();
            tokio::spawn(async move {
                if let Err(e) = runner.drive(guard, request).await {
                    debug!(task_id = %spawned_id, error = %e, "async task ended with an error");
                }
            });
            return Ok(MlOutput::AsyncTask {
                task_id,
                status: TaskState::Created,
            });
        }

        self.drive(guard, request).await
    }

    async fn drive(&self, guard: TaskGuard, request: TaskRequest) -> MlResult<MlOutput> {
        let result = match request {
            TaskRequest::Predict(req) => predict::run(self, &guard, req).await,
            TaskRequest::Train(req) => train::run(self, &guard, req).await,
        };
        guard.finish(result).await
    }

    /* ==================== shared steps ==================== */

    /// Search queries are fetched through the data resolver; inline frames
    /// pass through.
    async fn resolve_input(&self, input: &MlInput) -> MlResult<MlInput> {
        if input.data_frame().is_some() {
            return Ok(input.clone());
        }
        let frame = self.data.resolve(&input.input_dataset).await?;
        Ok(input.with_data_frame(frame))
    }

    /// Runs CPU bound engine work on a blocking thread, at most `pool_size`
    /// at a time. The permit lives with the job, so a caller that goes away
    /// does not free the slot early.
    async fn run_on_pool<T, F>(&self, job: F) -> MlResult<T>
    where
        F: FnOnce() -> MlResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MlError::Internal("ml task pool is closed".to_string()))?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| MlError::Internal(format!("ml task panicked: {}", e)))?
    }

    /* ==================== lookups ==================== */

    /// Live registry first, then persisted records, then the peers.
    pub async fn get_task(&self, task_id: &str) -> MlResult<MlTask> {
        if let Some(task) = self.find_local_task(task_id).await? {
            return Ok(task);
        }

        for node in self.cluster.alive_nodes() {
            if self.cluster.is_local(&node) {
                continue;
            }
            match self.transport.get_task(&node, task_id).await {
                Ok(Some(task)) => return Ok(task),
                Ok(None) => {}
                Err(e) => warn!(node = %node.id, error = %e, "task lookup on peer failed"),
            }
        }

        Err(MlError::NotFound(format!("Fail to find task: {}", task_id)))
    }

    /// Lookup restricted to this node, as served to peers.
    pub async fn find_local_task(&self, task_id: &str) -> MlResult<Option<MlTask>> {
        if let Some(task) = self.manager.get_task(task_id) {
            return Ok(Some(task));
        }
        self.tasks.get(task_id).await
    }

    pub fn node_stats(&self) -> NodeStatsResponse {
        NodeStatsResponse {
            node_id: self.node_id().to_string(),
            executing_task_count: self.stats.value(ML_EXECUTING_TASK_COUNT),
            running_tasks: self.manager.running_task_count(),
            open_breaker: self.breakers.check_open(),
            stats: self.stats.snapshot(),
        }
    }
}
