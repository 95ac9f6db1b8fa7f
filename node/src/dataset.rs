use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::{DataFrame, InputDataset, MlError, MlResult};
use glob::glob;
use tracing::debug;

/// Turns a task's input dataset into rows.
#[async_trait]
pub trait DataResolver: Send + Sync {
    async fn resolve(&self, dataset: &InputDataset) -> MlResult<DataFrame>;
}

/// Serves search queries from CSV files on local disk.
///
/// An index `iris` maps to `<data_dir>/indices/iris.csv` plus every
/// `<data_dir>/indices/iris/*.csv`, concatenated in path order.
#[derive(Debug, Clone)]
pub struct CsvDataResolver {
    data_dir: PathBuf,
}

impl CsvDataResolver {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn index_files(&self, index: &str) -> MlResult<Vec<PathBuf>> {
        if index.is_empty() || index.contains(['/', '\\']) || index.contains("..") {
            return Err(MlError::InvalidArgument(format!("invalid index name: {}", index)));
        }
        let base = self.data_dir.join("indices");

        let mut files = Vec::new();
        let single = base.join(format!("{}.csv", index));
        if single.is_file() {
            files.push(single);
        }

        let pattern = base.join(index).join("*.csv");
        let pattern = pattern.to_string_lossy();
        let entries = glob(&pattern)
            .map_err(|e| MlError::Internal(format!("bad index pattern {}: {}", pattern, e)))?;
        let mut shards: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
        shards.sort();
        files.extend(shards);

        Ok(files)
    }
}

fn read_csv(path: &Path) -> MlResult<DataFrame> {
    let file = File::open(path)
        .map_err(|e| MlError::Storage(format!("cannot open {}: {}", path.display(), e)))?;
    DataFrame::from_csv_reader(file)
}

#[async_trait]
impl DataResolver for CsvDataResolver {
    async fn resolve(&self, dataset: &InputDataset) -> MlResult<DataFrame> {
        let (indices, columns, size) = match dataset {
            InputDataset::DataFrame { data_frame } => return Ok(data_frame.clone()),
            InputDataset::SearchQuery {
                indices,
                columns,
                size,
            } => (indices, columns.clone(), *size),
        };

        // 1) collect files of every index
        let mut files = Vec::new();
        for index in indices {
            let found = self.index_files(index)?;
            if found.is_empty() {
                return Err(MlError::NotFound(format!("no such index: {}", index)));
            }
            files.extend(found);
        }

        // 2) read and concatenate off the async runtime
        let frame = tokio::task::spawn_blocking(move || -> MlResult<DataFrame> {
            let mut frame = DataFrame::default();
            for path in &files {
                frame.append(read_csv(path)?)?;
            }
            Ok(frame)
        })
        .await
        .map_err(|e| MlError::Internal(format!("dataset reader panicked: {}", e)))??;

        // 3) projection and limit
        let frame = match &columns {
            Some(cols) if !cols.is_empty() => frame.select(cols)?,
            _ => frame,
        };
        let frame = match size {
            Some(n) => frame.head(n),
            None => frame,
        };

        debug!(rows = frame.len(), columns = frame.width(), "search query resolved");
        Ok(frame)
    }
}
