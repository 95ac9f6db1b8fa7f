use std::time::Duration;

use async_trait::async_trait;
use common::{
    MlError, MlResult, MlTask, NodeInfo, NodeStatsResponse, TaskGetResponse, TaskRequest,
    TaskResponse,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Node-to-node channel.
///
/// A remote error arrives as the same `MlError` the remote runner produced;
/// only failures to talk to the node at all become `TransportFailure`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs the request on `node` and returns its response unchanged.
    async fn send(&self, node: &NodeInfo, request: TaskRequest) -> MlResult<TaskResponse>;

    async fn node_stats(&self, node: &NodeInfo) -> MlResult<NodeStatsResponse>;

    async fn get_task(&self, node: &NodeInfo, task_id: &str) -> MlResult<Option<MlTask>>;
}

/// JSON over HTTP against the `/internal` routes of the peer.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> MlResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MlError::Internal(format!("cannot build http client: {}", e)))?;
        Ok(Self { client })
    }
}

fn transport_err(node: &NodeInfo, e: reqwest::Error) -> MlError {
    MlError::TransportFailure(format!("node {} ({}): {}", node.id, node.url, e))
}

/// Decodes a 2xx body as `T`, anything else as the remote `MlError`.
async fn decode<T: DeserializeOwned>(node: &NodeInfo, resp: Response) -> MlResult<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(|e| transport_err(node, e));
    }

    let body = resp.text().await.map_err(|e| transport_err(node, e))?;
    match serde_json::from_str::<MlError>(&body) {
        Ok(remote) => Err(remote),
        Err(_) => Err(MlError::TransportFailure(format!(
            "node {} answered {}: {}",
            node.id, status, body
        ))),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, node: &NodeInfo, request: TaskRequest) -> MlResult<TaskResponse> {
        let url = format!(
            "{}/internal/{}",
            node.url.trim_end_matches('/'),
            request.action_name()
        );
        debug!(node = %node.id, %url, "forwarding task request");

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_err(node, e))?;
        decode(node, resp).await
    }

    async fn node_stats(&self, node: &NodeInfo) -> MlResult<NodeStatsResponse> {
        let url = format!("{}/internal/stats", node.url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_err(node, e))?;
        decode(node, resp).await
    }

    async fn get_task(&self, node: &NodeInfo, task_id: &str) -> MlResult<Option<MlTask>> {
        let url = format!(
            "{}/internal/tasks/{}",
            node.url.trim_end_matches('/'),
            task_id
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_err(node, e))?;
        let body: TaskGetResponse = decode(node, resp).await?;
        Ok(body.task)
    }
}
