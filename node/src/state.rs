use std::sync::Arc;

use crate::cluster::ClusterState;
use crate::runner::TaskRunner;

/// Shared by every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub runner: TaskRunner,
    pub cluster: Arc<ClusterState>,
}

impl AppState {
    pub fn new(runner: TaskRunner, cluster: Arc<ClusterState>) -> Self {
        Self { runner, cluster }
    }
}
