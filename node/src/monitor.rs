use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sysinfo::{System, SystemExt};
use tracing::{debug, warn};

use crate::breaker::MemoryCircuitBreaker;
use crate::cluster::ClusterState;
use crate::transport::Transport;

pub struct Monitor {
    pub cluster: Arc<ClusterState>,
    pub transport: Arc<dyn Transport>,
    pub memory_breaker: Arc<MemoryCircuitBreaker>,
    pub interval: Duration,
    pub peer_dead_timeout: Duration,
}

impl Monitor {
    /// Background loop: memory readings into the breaker, peer probes, dead
    /// peer sweep.
    pub async fn run(self) {
        let mut sys = System::new();
        loop {
            self.memory_breaker.refresh(&mut sys);
            debug!(used_percent = self.memory_breaker.used_percent(), "memory reading");

            probe_peers(&self.cluster, self.transport.as_ref()).await;

            let dead = self
                .cluster
                .sweep_once(SystemTime::now(), self.peer_dead_timeout);
            if !dead.is_empty() {
                warn!(?dead, "peers stopped answering");
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

/// One probe per configured peer, dead ones included so they can come back.
pub async fn probe_peers(cluster: &ClusterState, transport: &dyn Transport) {
    for peer in cluster.peer_nodes() {
        match transport.node_stats(&peer).await {
            Ok(stats) => {
                debug!(node = %peer.id, executing = stats.executing_task_count, "peer alive");
                cluster.record_heartbeat(&peer.id, SystemTime::now());
            }
            Err(e) => debug!(node = %peer.id, error = %e, "peer probe failed"),
        }
    }
}
