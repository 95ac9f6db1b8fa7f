use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{MlError, MlResult, NodeInfo};
use tracing::{debug, warn};

use crate::cluster::ClusterState;
use crate::stats::{MlStats, ML_EXECUTING_TASK_COUNT};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    RoundRobin,
    LeastLoaded,
}

impl FromStr for DispatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round_robin" | "round-robin" => Ok(DispatchPolicy::RoundRobin),
            "least_loaded" | "least-loaded" => Ok(DispatchPolicy::LeastLoaded),
            other => Err(format!("unknown dispatch policy: {}", other)),
        }
    }
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchPolicy::RoundRobin => f.write_str("round_robin"),
            DispatchPolicy::LeastLoaded => f.write_str("least_loaded"),
        }
    }
}

/// Picks the node that runs a task. Never returns a node known to be down and
/// never retries; an error is final for the task being dispatched.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch_task(&self) -> MlResult<NodeInfo>;
}

/// Policy driven dispatcher over the live nodes of the cluster.
pub struct TaskDispatcher {
    cluster: Arc<ClusterState>,
    transport: Arc<dyn Transport>,
    stats: Arc<MlStats>,
    policy: DispatchPolicy,
    cursor: AtomicUsize,
}

impl TaskDispatcher {
    pub fn new(
        cluster: Arc<ClusterState>,
        transport: Arc<dyn Transport>,
        stats: Arc<MlStats>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            cluster,
            transport,
            stats,
            policy,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Dispatcher for TaskDispatcher {
    async fn dispatch_task(&self) -> MlResult<NodeInfo> {
        let nodes = self.cluster.alive_nodes();
        if nodes.is_empty() {
            return Err(MlError::DispatchFailure("no eligible node".to_string()));
        }

        let chosen = match self.policy {
            DispatchPolicy::RoundRobin => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % nodes.len();
                nodes[idx].clone()
            }
            DispatchPolicy::LeastLoaded => self.least_loaded(nodes).await?,
        };

        debug!(node = %chosen.id, policy = %self.policy, "task dispatched");
        Ok(chosen)
    }
}

impl TaskDispatcher {
    /// Lowest executing task count wins; ties go to the earlier node, which
    /// keeps the local node ahead of equally loaded peers.
    async fn least_loaded(&self, nodes: Vec<NodeInfo>) -> MlResult<NodeInfo> {
        let mut best: Option<(u64, NodeInfo)> = None;

        for node in nodes {
            let load = if self.cluster.is_local(&node) {
                self.stats.value(ML_EXECUTING_TASK_COUNT)
            } else {
                match self.transport.node_stats(&node).await {
                    Ok(remote) => remote.executing_task_count,
                    Err(e) => {
                        warn!(node = %node.id, error = %e, "skipping node without stats");
                        continue;
                    }
                }
            };

            match &best {
                Some((best_load, _)) if *best_load <= load => {}
                _ => best = Some((load, node)),
            }
        }

        best.map(|(_, node)| node)
            .ok_or_else(|| MlError::DispatchFailure("no node reported its load".to_string()))
    }
}
