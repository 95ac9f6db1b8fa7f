use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use common::NodeInfo;

use crate::dispatcher::DispatchPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_TASK_POOL_SIZE: usize = 4;
pub const DEFAULT_MAX_RUNNING_TASKS: usize = 10;
pub const DEFAULT_MEMORY_THRESHOLD_PERCENT: u8 = 85;
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PEER_DEAD_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 5;

/// Node settings, read from `ML_*` environment variables.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub bind_addr: SocketAddr,
    pub public_url: String,
    pub peers: Vec<NodeInfo>,
    pub dispatch_policy: DispatchPolicy,
    pub task_pool_size: usize,
    pub max_running_tasks: usize,
    pub memory_threshold_percent: u8,
    pub data_dir: PathBuf,
    pub transport_timeout: Duration,
    pub peer_dead_timeout: Duration,
    pub monitor_interval: Duration,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`NodeConfig::from_env`] over any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let node_id = match get("ML_NODE_ID") {
            Some(id) => id,
            None => hostname::get()
                .context("cannot read host name, set ML_NODE_ID")?
                .to_string_lossy()
                .to_string(),
        };

        let bind_addr: SocketAddr = get("ML_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("invalid ML_BIND_ADDR")?;

        let public_url = get("ML_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://{}:{}", node_id, bind_addr.port()));

        let peers = match get("ML_PEERS") {
            Some(raw) => parse_peers(&raw).context("invalid ML_PEERS")?,
            None => Vec::new(),
        };

        let dispatch_policy = match get("ML_DISPATCH_POLICY") {
            Some(raw) => raw
                .parse::<DispatchPolicy>()
                .map_err(|e| anyhow!(e))
                .context("invalid ML_DISPATCH_POLICY")?,
            None => DispatchPolicy::RoundRobin,
        };

        let task_pool_size = parse_or(&get, "ML_TASK_POOL_SIZE", DEFAULT_TASK_POOL_SIZE)?;
        let max_running_tasks =
            parse_or(&get, "ML_MAX_RUNNING_TASKS", DEFAULT_MAX_RUNNING_TASKS)?;
        if task_pool_size == 0 || max_running_tasks == 0 {
            bail!("ML_TASK_POOL_SIZE and ML_MAX_RUNNING_TASKS must be positive");
        }

        let memory_threshold_percent = parse_or(
            &get,
            "ML_MEMORY_THRESHOLD_PERCENT",
            DEFAULT_MEMORY_THRESHOLD_PERCENT,
        )?;
        if memory_threshold_percent == 0 || memory_threshold_percent > 100 {
            bail!("ML_MEMORY_THRESHOLD_PERCENT must be in 1..=100");
        }

        Ok(Self {
            node_id,
            bind_addr,
            public_url,
            peers,
            dispatch_policy,
            task_pool_size,
            max_running_tasks,
            memory_threshold_percent,
            data_dir: PathBuf::from(get("ML_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            transport_timeout: Duration::from_secs(parse_or(
                &get,
                "ML_TRANSPORT_TIMEOUT_SECS",
                DEFAULT_TRANSPORT_TIMEOUT_SECS,
            )?),
            peer_dead_timeout: Duration::from_secs(parse_or(
                &get,
                "ML_PEER_DEAD_TIMEOUT_SECS",
                DEFAULT_PEER_DEAD_TIMEOUT_SECS,
            )?),
            monitor_interval: Duration::from_secs(
                parse_or(&get, "ML_MONITOR_INTERVAL_SECS", DEFAULT_MONITOR_INTERVAL_SECS)?.max(1),
            ),
        })
    }

    pub fn local_node(&self) -> NodeInfo {
        NodeInfo::new(self.node_id.clone(), self.public_url.clone())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("invalid {}={}: {}", key, raw, e)),
        None => Ok(default),
    }
}

/// `id=url,id=url`
fn parse_peers(raw: &str) -> Result<Vec<NodeInfo>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (id, url) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("peer '{}' is not id=url", entry))?;
            let (id, url) = (id.trim(), url.trim());
            if id.is_empty() || url.is_empty() {
                bail!("peer '{}' is not id=url", entry);
            }
            Ok(NodeInfo::new(id, url.trim_end_matches('/')))
        })
        .collect()
}
