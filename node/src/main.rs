use std::sync::Arc;

use anyhow::{Context, Result};
use common::BuiltinEngine;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use node::access::BackendRoleAccess;
use node::breaker::{CircuitBreakerService, MemoryCircuitBreaker};
use node::cluster::ClusterState;
use node::config::NodeConfig;
use node::dataset::CsvDataResolver;
use node::dispatcher::TaskDispatcher;
use node::handlers;
use node::monitor::Monitor;
use node::runner::{RunnerParts, TaskRunner};
use node::state::AppState;
use node::stats::MlStats;
use node::store::FsStore;
use node::task_manager::TaskManager;
use node::transport::{HttpTransport, Transport};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("node=debug,ml_node=debug,tower_http=info,axum=info")),
        )
        .init();

    let config = NodeConfig::from_env().context("loading node configuration")?;
    info!(
        node = %config.node_id,
        url = %config.public_url,
        peers = config.peers.len(),
        policy = %config.dispatch_policy,
        "starting ml node"
    );

    // 1) process wide state
    let cluster = Arc::new(ClusterState::new(config.local_node(), config.peers.clone()));
    let stats = Arc::new(MlStats::new());
    let manager = Arc::new(TaskManager::new(config.max_running_tasks));
    let memory_breaker = Arc::new(MemoryCircuitBreaker::new(config.memory_threshold_percent));
    let breakers = CircuitBreakerService::new().with_breaker(memory_breaker.clone());

    // 2) collaborators
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(config.transport_timeout).context("building node transport")?,
    );
    let store = Arc::new(FsStore::new(&config.data_dir));
    let dispatcher = Arc::new(TaskDispatcher::new(
        cluster.clone(),
        transport.clone(),
        stats.clone(),
        config.dispatch_policy,
    ));

    let runner = TaskRunner::new(RunnerParts {
        cluster: cluster.clone(),
        manager,
        stats,
        dispatcher,
        breakers,
        transport: transport.clone(),
        models: store.clone(),
        tasks: store,
        data: Arc::new(CsvDataResolver::new(&config.data_dir)),
        engine: Arc::new(BuiltinEngine),
        access: Arc::new(BackendRoleAccess),
        pool_size: config.task_pool_size,
    });

    // 3) breaker readings and peer liveness in the background
    let monitor = Monitor {
        cluster: cluster.clone(),
        transport,
        memory_breaker,
        interval: config.monitor_interval,
        peer_dead_timeout: config.peer_dead_timeout,
    };
    tokio::spawn(monitor.run());

    // 4) http
    let app = handlers::build_router(AppState::new(runner, cluster));
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("ml node listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
