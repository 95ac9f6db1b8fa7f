#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{
    DataFrame, Engine, InputDataset, MlError, MlInput, MlResult, MlTask, Model, NodeInfo,
    NodeStatsResponse, PredictionTaskRequest, TaskRequest, TaskResponse, TrainingTaskRequest,
    User,
};
use node::access::BackendRoleAccess;
use node::breaker::{CircuitBreaker, CircuitBreakerService};
use node::cluster::ClusterState;
use node::dataset::DataResolver;
use node::dispatcher::{DispatchPolicy, Dispatcher, TaskDispatcher};
use node::runner::{RunnerParts, TaskRunner};
use node::stats::MlStats;
use node::store::{InMemoryModelStore, InMemoryTaskStore, ModelStore, TaskStore};
use node::task_manager::TaskManager;
use node::transport::Transport;

pub const FUNCTION: &str = "fake_algo";
/// Function name the fake engine fails on.
pub const BROKEN_FUNCTION: &str = "broken_algo";

/* ---------------- fakes ---------------- */

#[derive(Default)]
pub struct SwitchBreaker {
    open: AtomicBool,
}

impl SwitchBreaker {
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

impl CircuitBreaker for SwitchBreaker {
    fn name(&self) -> &str {
        "switch"
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Predicts `row sum * model.version` per row; trains a model whose content is
/// the row count. Sleeps `delay` on every call.
#[derive(Default)]
pub struct FakeEngine {
    pub delay: Duration,
}

impl Engine for FakeEngine {
    fn supports(&self, function_name: &str) -> bool {
        function_name == FUNCTION || function_name == BROKEN_FUNCTION
    }

    fn predict(&self, input: &MlInput, model: &Model) -> MlResult<DataFrame> {
        std::thread::sleep(self.delay);
        if input.function_name == BROKEN_FUNCTION {
            return Err(MlError::EngineFailure("engine exploded".into()));
        }
        let frame = input
            .data_frame()
            .ok_or_else(|| MlError::EngineFailure("unresolved input".into()))?;
        let rows = frame
            .rows
            .iter()
            .map(|r| vec![r.iter().sum::<f64>() * model.version as f64])
            .collect();
        DataFrame::new(vec!["prediction".into()], rows)
    }

    fn train(&self, input: &MlInput) -> MlResult<Model> {
        std::thread::sleep(self.delay);
        if input.function_name == BROKEN_FUNCTION {
            return Err(MlError::EngineFailure("engine exploded".into()));
        }
        let rows = input.data_frame().map(|f| f.len()).unwrap_or(0);
        Ok(Model::new(
            input.function_name.clone(),
            1,
            rows.to_string().into_bytes(),
        ))
    }
}

/// Serves every search query with the same frame.
pub struct FixedData(pub DataFrame);

#[async_trait]
impl DataResolver for FixedData {
    async fn resolve(&self, dataset: &InputDataset) -> MlResult<DataFrame> {
        match dataset {
            InputDataset::DataFrame { data_frame } => Ok(data_frame.clone()),
            InputDataset::SearchQuery { indices, .. } if indices.iter().any(|i| i == "missing") => {
                Err(MlError::NotFound("no such index: missing".into()))
            }
            InputDataset::SearchQuery { .. } => Ok(self.0.clone()),
        }
    }
}

/// Task store whose writes take `delay`; reads are immediate.
pub struct SlowTaskStore {
    pub inner: Arc<InMemoryTaskStore>,
    pub delay: Duration,
}

#[async_trait]
impl TaskStore for SlowTaskStore {
    async fn put(&self, task: &MlTask) -> MlResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.put(task).await
    }

    async fn get(&self, task_id: &str) -> MlResult<Option<MlTask>> {
        self.inner.get(task_id).await
    }
}

pub struct FailingDispatcher;

#[async_trait]
impl Dispatcher for FailingDispatcher {
    async fn dispatch_task(&self) -> MlResult<NodeInfo> {
        Err(MlError::DispatchFailure("no eligible node".into()))
    }
}

/// In-process stand-in for the HTTP transport: calls straight into the
/// target node's runner.
#[derive(Default)]
pub struct LoopbackTransport {
    runners: Mutex<HashMap<String, TaskRunner>>,
}

impl LoopbackTransport {
    pub fn attach(&self, runner: TaskRunner) {
        self.runners
            .lock()
            .unwrap()
            .insert(runner.node_id().to_string(), runner);
    }

    pub fn detach(&self, node_id: &str) {
        self.runners.lock().unwrap().remove(node_id);
    }

    fn runner(&self, node: &NodeInfo) -> MlResult<TaskRunner> {
        self.runners
            .lock()
            .unwrap()
            .get(&node.id)
            .cloned()
            .ok_or_else(|| MlError::TransportFailure(format!("node {} unreachable", node.id)))
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, node: &NodeInfo, request: TaskRequest) -> MlResult<TaskResponse> {
        let runner = self.runner(node)?;
        // through JSON, like the real transport
        let wire = serde_json::to_string(&request).unwrap();
        let request: TaskRequest = serde_json::from_str(&wire).unwrap();
        runner.run_local(request).await.map(TaskResponse::from)
    }

    async fn node_stats(&self, node: &NodeInfo) -> MlResult<NodeStatsResponse> {
        Ok(self.runner(node)?.node_stats())
    }

    async fn get_task(&self, node: &NodeInfo, task_id: &str) -> MlResult<Option<MlTask>> {
        self.runner(node)?.find_local_task(task_id).await
    }
}

/* ---------------- cluster harness ---------------- */

pub struct TestNode {
    pub runner: TaskRunner,
    pub cluster: Arc<ClusterState>,
    pub stats: Arc<MlStats>,
    pub manager: Arc<TaskManager>,
    pub breaker: Arc<SwitchBreaker>,
    pub tasks: Arc<InMemoryTaskStore>,
}

impl TestNode {
    pub fn stat(&self, name: &str) -> u64 {
        self.stats.value(name)
    }
}

pub struct Options {
    pub policy: DispatchPolicy,
    pub pool_size: usize,
    pub max_running_tasks: usize,
    pub engine_delay: Duration,
    pub failing_dispatch: bool,
    /// Time every final task record takes to be stored.
    pub persist_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            policy: DispatchPolicy::RoundRobin,
            pool_size: 4,
            max_running_tasks: 64,
            engine_delay: Duration::ZERO,
            failing_dispatch: false,
            persist_delay: Duration::ZERO,
        }
    }
}

pub struct TestCluster {
    pub nodes: Vec<TestNode>,
    pub models: Arc<InMemoryModelStore>,
    pub transport: Arc<LoopbackTransport>,
}

impl TestCluster {
    pub fn single() -> Self {
        Self::build(&["node-a"], Options::default())
    }

    /// Every node sees every other node as a peer; the model store is shared,
    /// task stores are per node.
    pub fn build(ids: &[&str], opts: Options) -> Self {
        let models = Arc::new(InMemoryModelStore::new());
        let transport = Arc::new(LoopbackTransport::default());
        let infos: Vec<NodeInfo> = ids
            .iter()
            .map(|id| NodeInfo::new(*id, format!("http://{}", id)))
            .collect();

        let nodes = infos
            .iter()
            .map(|local| {
                let cluster = Arc::new(ClusterState::new(local.clone(), infos.clone()));
                let stats = Arc::new(MlStats::new());
                let manager = Arc::new(TaskManager::new(opts.max_running_tasks));
                let breaker = Arc::new(SwitchBreaker::default());
                let tasks = Arc::new(InMemoryTaskStore::new());

                let dispatcher: Arc<dyn Dispatcher> = if opts.failing_dispatch {
                    Arc::new(FailingDispatcher)
                } else {
                    Arc::new(TaskDispatcher::new(
                        cluster.clone(),
                        transport.clone(),
                        stats.clone(),
                        opts.policy,
                    ))
                };

                let runner = TaskRunner::new(RunnerParts {
                    cluster: cluster.clone(),
                    manager: manager.clone(),
                    stats: stats.clone(),
                    dispatcher,
                    breakers: CircuitBreakerService::new().with_breaker(breaker.clone()),
                    transport: transport.clone(),
                    models: models.clone(),
                    tasks: Arc::new(SlowTaskStore {
                        inner: tasks.clone(),
                        delay: opts.persist_delay,
                    }),
                    data: Arc::new(FixedData(sample_frame())),
                    engine: Arc::new(FakeEngine {
                        delay: opts.engine_delay,
                    }),
                    access: Arc::new(BackendRoleAccess),
                    pool_size: opts.pool_size,
                });
                transport.attach(runner.clone());

                TestNode {
                    runner,
                    cluster,
                    stats,
                    manager,
                    breaker,
                    tasks,
                }
            })
            .collect();

        Self {
            nodes,
            models,
            transport,
        }
    }

    pub fn node(&self, idx: usize) -> &TestNode {
        &self.nodes[idx]
    }

    /// Stores a model (version 2) owned by `owner` and returns its id.
    pub async fn add_model(&self, owner: Option<User>) -> String {
        let model = Model::new(FUNCTION, 2, b"fake".to_vec()).with_owner(owner);
        self.models.put(&model).await.unwrap();
        model.id
    }
}

/* ---------------- request builders ---------------- */

pub fn sample_frame() -> DataFrame {
    DataFrame::new(
        vec!["a".into(), "b".into()],
        vec![vec![1.0, 2.0], vec![3.0, 4.0]],
    )
    .unwrap()
}

pub fn inline_input(function: &str) -> MlInput {
    MlInput {
        function_name: function.to_string(),
        parameters: serde_json::Value::Null,
        input_dataset: InputDataset::DataFrame {
            data_frame: sample_frame(),
        },
    }
}

pub fn predict(model_id: Option<&str>, user: Option<User>) -> TaskRequest {
    TaskRequest::Predict(PredictionTaskRequest {
        input: inline_input(FUNCTION),
        model_id: model_id.map(str::to_string),
        is_async: false,
        user,
    })
}

pub fn train(function: &str, is_async: bool, user: Option<User>) -> TaskRequest {
    TaskRequest::Train(TrainingTaskRequest {
        input: inline_input(function),
        is_async,
        user,
    })
}

pub fn alice() -> User {
    User::new("alice").with_backend_roles(["ml-team"])
}

pub fn eve() -> User {
    User::new("eve").with_backend_roles(["ops"])
}
