use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{
    DataFrame, InputDataset, MlError, MlOutput, MlTask, NodeMetrics, NodeStatsResponse,
    SubmitTaskBody, TaskResponse,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

const USER_HEADER: &str = "x-ml-user";

#[derive(Parser)]
#[command(name = "ml-client")]
#[command(about = "Submit predictions and trainings to an ML node")]
struct Cli {
    /// Base URL of any node of the cluster
    #[arg(long, env = "ML_NODE_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Requesting user as `name|backend_role,..|role,..`
    #[arg(long, env = "ML_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prediction with an existing model
    Predict {
        #[arg(value_name = "ALGORITHM")]
        algorithm: String,

        #[arg(long)]
        model_id: String,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Train a new model
    Train {
        #[arg(value_name = "ALGORITHM")]
        algorithm: String,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Show a task
    Task {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Counters of the node
    Stats,
    /// Cluster view of the node
    Nodes,
}

#[derive(Args)]
struct DataArgs {
    /// Local CSV file sent inline
    #[arg(long, conflicts_with = "index", required_unless_present = "index")]
    csv: Option<PathBuf>,

    /// Index resolved on the node (repeatable)
    #[arg(long)]
    index: Vec<String>,

    /// Columns to keep from the index
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Max rows read from the index
    #[arg(long)]
    size: Option<usize>,

    /// Algorithm parameters as a JSON object, e.g. '{"k": 3}'
    #[arg(long)]
    params: Option<String>,

    /// Return a task id right away instead of waiting
    #[arg(long = "async")]
    is_async: bool,
}

impl DataArgs {
    fn into_body(self) -> Result<SubmitTaskBody> {
        let parameters = match &self.params {
            Some(raw) => serde_json::from_str::<Value>(raw).context("--params is not valid JSON")?,
            None => Value::Null,
        };

        let input_dataset = match (self.csv, self.index.is_empty()) {
            (Some(path), _) => {
                let file = File::open(&path)
                    .with_context(|| format!("cannot open {}", path.display()))?;
                let data_frame = DataFrame::from_csv_reader(file)?;
                InputDataset::DataFrame { data_frame }
            }
            (None, false) => InputDataset::SearchQuery {
                indices: self.index,
                columns: (!self.columns.is_empty()).then_some(self.columns),
                size: self.size,
            },
            (None, true) => bail!("either --csv or --index is required"),
        };

        Ok(SubmitTaskBody {
            parameters,
            input_dataset,
            is_async: self.is_async,
        })
    }
}

/// Decodes a node answer; error bodies carry an `MlError`.
async fn read<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }
    let body = resp.text().await?;
    match serde_json::from_str::<MlError>(&body) {
        Ok(err) => bail!("{} ({})", err, status),
        Err(_) => bail!("node answered {}: {}", status, body),
    }
}

fn with_user(req: RequestBuilder, user: &Option<String>) -> RequestBuilder {
    match user {
        Some(user) => req.header(USER_HEADER, user),
        None => req,
    }
}

fn print_frame(frame: &DataFrame) {
    println!("{}", frame.columns.join(","));
    for row in &frame.rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("{}", cells.join(","));
    }
}

fn print_output(output: &MlOutput) {
    match output {
        MlOutput::Prediction {
            task_id,
            status,
            prediction_result,
        } => {
            println!("Task {} {}", task_id, status.as_str());
            print_frame(prediction_result);
        }
        MlOutput::Training {
            task_id,
            model_id,
            status,
        } => {
            println!("Task {} {}", task_id, status.as_str());
            println!("  model_id: {}", model_id);
        }
        MlOutput::AsyncTask { task_id, status } => {
            println!("Task {} {}", task_id, status.as_str());
            println!("  poll with: ml-client task {}", task_id);
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Predict {
            algorithm,
            model_id,
            data,
        } => {
            let url = format!("{}/api/v1/_predict/{}/{}", base_url, algorithm, model_id);
            let req = with_user(client.post(&url), &cli.user).json(&data.into_body()?);
            let resp: TaskResponse = read(req.send().await?).await?;
            print_output(&resp.output);
        }

        Commands::Train { algorithm, data } => {
            let url = format!("{}/api/v1/_train/{}", base_url, algorithm);
            let req = with_user(client.post(&url), &cli.user).json(&data.into_body()?);
            let resp: TaskResponse = read(req.send().await?).await?;
            print_output(&resp.output);
        }

        Commands::Task { id } => {
            let url = format!("{}/api/v1/tasks/{}", base_url, id);
            let task: MlTask = read(client.get(&url).send().await?).await?;
            println!("Task {}", task.task_id);
            println!("  type      : {:?}", task.task_type);
            println!("  function  : {}", task.function_name);
            println!("  state     : {}", task.state.as_str());
            println!("  node      : {}", task.worker_node);
            println!("  async     : {}", task.is_async);
            if let Some(model_id) = &task.model_id {
                println!("  model_id  : {}", model_id);
            }
            println!("  created   : {}", task.create_time);
            println!("  updated   : {}", task.last_update_time);
            if let Some(error) = &task.error {
                println!("  error     : {}", error);
            }
            if let Some(result) = &task.prediction_result {
                print_frame(result);
            }
        }

        Commands::Stats => {
            let url = format!("{}/api/v1/stats", base_url);
            let stats: NodeStatsResponse = read(client.get(&url).send().await?).await?;
            println!("Node {}", stats.node_id);
            println!("  executing : {}", stats.executing_task_count);
            println!("  registered: {}", stats.running_tasks);
            match &stats.open_breaker {
                Some(name) => println!("  breaker   : {} OPEN", name),
                None => println!("  breaker   : closed"),
            }
            for (name, value) in &stats.stats {
                println!("  {:<40} {}", name, value);
            }
        }

        Commands::Nodes => {
            let url = format!("{}/api/v1/nodes", base_url);
            let nodes: Vec<NodeMetrics> = read(client.get(&url).send().await?).await?;
            for n in nodes {
                let state = if n.dead { "DEAD" } else { "alive" };
                let seen = n
                    .last_heartbeat_secs_ago
                    .map(|s| format!("{} s ago", s))
                    .unwrap_or_else(|| "-".to_string());
                let local = if n.local { " (this node)" } else { "" };
                println!("{:<16} {:<32} {:<6} {}{}", n.node_id, n.url, state, seen, local);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn data_args() -> DataArgs {
        DataArgs {
            csv: None,
            index: Vec::new(),
            columns: Vec::new(),
            size: None,
            params: None,
            is_async: false,
        }
    }

    #[test]
    fn csv_is_sent_inline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "x,y\n1,2\n3,4").unwrap();

        let body = DataArgs {
            csv: Some(file.path().to_path_buf()),
            params: Some(r#"{"k": 2}"#.into()),
            ..data_args()
        }
        .into_body()
        .unwrap();

        assert_eq!(body.parameters["k"], 2);
        match body.input_dataset {
            InputDataset::DataFrame { data_frame } => assert_eq!(data_frame.len(), 2),
            other => panic!("unexpected dataset {:?}", other),
        }
    }

    #[test]
    fn index_becomes_a_search_query() {
        let body = DataArgs {
            index: vec!["iris".into()],
            columns: vec!["a".into(), "b".into()],
            size: Some(10),
            is_async: true,
            ..data_args()
        }
        .into_body()
        .unwrap();

        assert!(body.is_async);
        assert_eq!(
            body.input_dataset,
            InputDataset::SearchQuery {
                indices: vec!["iris".into()],
                columns: Some(vec!["a".into(), "b".into()]),
                size: Some(10),
            }
        );
    }

    #[test]
    fn bad_params_are_rejected() {
        let args = DataArgs {
            index: vec!["iris".into()],
            params: Some("{not json".into()),
            ..data_args()
        };
        assert!(args.into_body().is_err());
        assert!(data_args().into_body().is_err());
    }
}
