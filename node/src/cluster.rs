use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use common::{NodeId, NodeInfo, NodeMetrics};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PeerMeta {
    pub info: NodeInfo,
    pub last_heartbeat: Option<SystemTime>,
    pub dead: bool,
}

/// This node's view of the cluster: itself plus statically configured peers
/// with their liveness as seen by the monitor.
pub struct ClusterState {
    local: NodeInfo,
    peers: Mutex<HashMap<NodeId, PeerMeta>>,
}

impl ClusterState {
    /// Peers start alive; the monitor marks them dead once they stop answering.
    pub fn new(local: NodeInfo, peers: Vec<NodeInfo>) -> Self {
        let now = SystemTime::now();
        let peers = peers
            .into_iter()
            .filter(|p| p.id != local.id)
            .map(|info| {
                (
                    info.id.clone(),
                    PeerMeta {
                        info,
                        last_heartbeat: Some(now),
                        dead: false,
                    },
                )
            })
            .collect();
        Self {
            local,
            peers: Mutex::new(peers),
        }
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<NodeId, PeerMeta>> {
        self.peers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn local_node(&self) -> &NodeInfo {
        &self.local
    }

    pub fn is_local(&self, node: &NodeInfo) -> bool {
        node.id == self.local.id
    }

    /// Every node eligible to run a task: the local node first, then live
    /// peers sorted by id.
    pub fn alive_nodes(&self) -> Vec<NodeInfo> {
        let mut peers: Vec<NodeInfo> = self
            .peers()
            .values()
            .filter(|p| !p.dead)
            .map(|p| p.info.clone())
            .collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));

        let mut nodes = Vec::with_capacity(peers.len() + 1);
        nodes.push(self.local.clone());
        nodes.extend(peers);
        nodes
    }

    /// All configured peers, dead or alive.
    pub fn peer_nodes(&self) -> Vec<NodeInfo> {
        let mut peers: Vec<NodeInfo> = self.peers().values().map(|p| p.info.clone()).collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn record_heartbeat(&self, node_id: &str, at: SystemTime) {
        if let Some(meta) = self.peers().get_mut(node_id) {
            if meta.dead {
                info!(node = node_id, "peer is back");
            }
            meta.last_heartbeat = Some(at);
            meta.dead = false;
        }
    }

    /// Marks peers without a heartbeat for longer than `timeout` as dead and
    /// returns the ones that died in this pass.
    pub fn sweep_once(&self, now: SystemTime, timeout: Duration) -> Vec<NodeId> {
        let mut newly_dead = Vec::new();
        for (node_id, meta) in self.peers().iter_mut() {
            if meta.dead {
                continue;
            }
            let Some(last) = meta.last_heartbeat else {
                continue;
            };
            // a heartbeat in the future is odd, skip it
            let Ok(elapsed) = now.duration_since(last) else {
                continue;
            };
            if elapsed > timeout {
                meta.dead = true;
                warn!(node = %node_id, ?elapsed, "marking peer as DEAD");
                newly_dead.push(node_id.clone());
            }
        }
        newly_dead
    }

    pub fn metrics(&self, now: SystemTime) -> Vec<NodeMetrics> {
        let mut out = vec![NodeMetrics {
            node_id: self.local.id.clone(),
            url: self.local.url.clone(),
            local: true,
            dead: false,
            last_heartbeat_secs_ago: None,
        }];

        let peers = self.peers();
        let mut rows: Vec<NodeMetrics> = peers
            .values()
            .map(|meta| NodeMetrics {
                node_id: meta.info.id.clone(),
                url: meta.info.url.clone(),
                local: false,
                dead: meta.dead,
                last_heartbeat_secs_ago: meta
                    .last_heartbeat
                    .map(|t| now.duration_since(t).unwrap_or_default().as_secs()),
            })
            .collect();
        rows.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        out.extend(rows);
        out
    }
}
