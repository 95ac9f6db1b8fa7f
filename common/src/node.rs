use serde::{Deserialize, Serialize};

use crate::task::MlTask;

pub type NodeId = String;

/// Addressing information for one cluster node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    pub id: NodeId,
    /// Base URL of the node's HTTP endpoint, e.g. `http://10.0.0.2:8080`.
    pub url: String,
}

impl NodeInfo {
    pub fn new(id: impl Into<NodeId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// What a node reports about itself on `/internal/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatsResponse {
    pub node_id: NodeId,
    pub executing_task_count: u64,
    pub running_tasks: usize,
    pub open_breaker: Option<String>,
    pub stats: std::collections::BTreeMap<String, u64>,
}

/// Row of `/api/v1/nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub node_id: NodeId,
    pub url: String,
    pub local: bool,
    pub dead: bool,
    pub last_heartbeat_secs_ago: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGetResponse {
    pub task: Option<MlTask>,
}
