use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use common::{MlError, MlResult, MlTask, Model};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn get(&self, model_id: &str) -> MlResult<Option<Model>>;

    async fn put(&self, model: &Model) -> MlResult<()>;
}

/// Final records of async tasks, kept after they leave the task manager.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn put(&self, task: &MlTask) -> MlResult<()>;

    async fn get(&self, task_id: &str) -> MlResult<Option<MlTask>>;
}

/* ==================== in memory ==================== */

#[derive(Default)]
pub struct InMemoryModelStore {
    models: Mutex<HashMap<String, Model>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn get(&self, model_id: &str) -> MlResult<Option<Model>> {
        let models = self
            .models
            .lock()
            .map_err(|_| MlError::Storage("model store lock poisoned".to_string()))?;
        Ok(models.get(model_id).cloned())
    }

    async fn put(&self, model: &Model) -> MlResult<()> {
        let mut models = self
            .models
            .lock()
            .map_err(|_| MlError::Storage("model store lock poisoned".to_string()))?;
        models.insert(model.id.clone(), model.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<String, MlTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn put(&self, task: &MlTask) -> MlResult<()> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| MlError::Storage("task store lock poisoned".to_string()))?;
        tasks.insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> MlResult<Option<MlTask>> {
        let tasks = self
            .tasks
            .lock()
            .map_err(|_| MlError::Storage("task store lock poisoned".to_string()))?;
        Ok(tasks.get(task_id).cloned())
    }
}

/* ==================== file system ==================== */

/// One JSON document per record under `<root>/models` and `<root>/tasks`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, kind: &str, id: &str) -> MlResult<PathBuf> {
        // ids end up in a file name
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(MlError::InvalidArgument(format!("invalid id: {}", id)));
        }
        Ok(self.root.join(kind).join(format!("{}.json", id)))
    }

    async fn read<T: DeserializeOwned>(path: &Path) -> MlResult<Option<T>> {
        let bytes = match fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MlError::Storage(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| MlError::Storage(format!("corrupted {}: {}", path.display(), e)))
    }

    async fn write<T: Serialize>(path: &Path, value: &T) -> MlResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| MlError::Storage(format!("cannot create {}: {}", dir.display(), e)))?;
        }
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| MlError::Storage(format!("cannot encode record: {}", e)))?;

        // write then rename so readers never see half a file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| MlError::Storage(format!("cannot write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| MlError::Storage(format!("cannot write {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "record stored");
        Ok(())
    }
}

#[async_trait]
impl ModelStore for FsStore {
    async fn get(&self, model_id: &str) -> MlResult<Option<Model>> {
        let path = match self.path("models", model_id) {
            Ok(p) => p,
            // a malformed id cannot name a stored model
            Err(_) => return Ok(None),
        };
        Self::read(&path).await
    }

    async fn put(&self, model: &Model) -> MlResult<()> {
        let path = self.path("models", &model.id)?;
        Self::write(&path, model).await
    }
}

#[async_trait]
impl TaskStore for FsStore {
    async fn put(&self, task: &MlTask) -> MlResult<()> {
        let path = self.path("tasks", &task.task_id)?;
        Self::write(&path, task).await
    }

    async fn get(&self, task_id: &str) -> MlResult<Option<MlTask>> {
        let path = match self.path("tasks", task_id) {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };
        Self::read(&path).await
    }
}
