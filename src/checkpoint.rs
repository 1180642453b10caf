//! Checkpoint stores
//!
//! A thread's whole `WorkflowState` is saved after every turn (including a
//! suspended one) and loaded at the start of the next.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::CheckpointError;
use crate::workflow::WorkflowState;

const MAX_THREAD_ID_LEN: usize = 128;

/// Thread ids double as file names, so only `[A-Za-z0-9_.-]` is accepted
pub fn is_valid_thread_id(thread_id: &str) -> bool {
    !thread_id.is_empty()
        && thread_id.len() <= MAX_THREAD_ID_LEN
        && thread_id != "."
        && thread_id != ".."
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Persistent per-thread state, keyed by thread id
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `Ok(None)` for a thread that has never been saved
    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, CheckpointError>;

    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError>;

    /// Deleting an unknown thread is not an error
    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError>;
}

/// Single-process store
#[derive(Default, Clone)]
pub struct InMemoryCheckpointStore {
    states: Arc<RwLock<HashMap<String, WorkflowState>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, CheckpointError> {
        Ok(self.states.read().await.get(thread_id).cloned())
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        self.states
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        self.states.write().await.remove(thread_id);
        Ok(())
    }
}

/// One JSON file per thread under a base directory
pub struct FileCheckpointStore {
    base_path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", thread_id))
    }

    fn io_error(path: &std::path::Path, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, CheckpointError> {
        let path = self.path_for(thread_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&path, e)),
        };
        let state = serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Serde {
            thread_id: thread_id.to_string(),
            source,
        })?;
        debug!(thread_id, path = %path.display(), "Loaded checkpoint");
        Ok(Some(state))
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| Self::io_error(&self.base_path, e))?;

        let json = serde_json::to_vec_pretty(state).map_err(|source| CheckpointError::Serde {
            thread_id: state.thread_id.clone(),
            source,
        })?;

        // Write-then-rename so a crash never leaves a torn checkpoint
        let path = self.path_for(&state.thread_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Self::io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::io_error(&path, e))?;
        debug!(thread_id = %state.thread_id, path = %path.display(), "Saved checkpoint");
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(thread_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}
