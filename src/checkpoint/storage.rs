//! Checkpoint storage providers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::AgentCheckpoint;
use crate::error::Result;

/// Storage contract for agent checkpoints. Implementations return checkpoints
/// sorted by creation time, oldest first.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    async fn get_checkpoints(&self, agent_id: &str) -> Result<Vec<AgentCheckpoint>>;

    async fn save(&self, agent_id: &str, checkpoint: &AgentCheckpoint) -> Result<()>;

    /// Returns whether the checkpoint existed.
    async fn delete_checkpoint(&self, agent_id: &str, checkpoint_id: &str) -> Result<bool>;

    /// Returns the number of checkpoints removed.
    async fn delete_checkpoints(&self, agent_id: &str) -> Result<usize>;
}

/// Process-lifetime storage backed by a map.
#[derive(Default)]
pub struct InMemoryStorage {
    checkpoints: Mutex<HashMap<String, Vec<AgentCheckpoint>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryStorage {
    async fn get_checkpoints(&self, agent_id: &str) -> Result<Vec<AgentCheckpoint>> {
        let checkpoints = self.checkpoints.lock().await;
        let mut result = checkpoints.get(agent_id).cloned().unwrap_or_default();
        result.sort_by_key(|c| c.created_at);
        Ok(result)
    }

    async fn save(&self, agent_id: &str, checkpoint: &AgentCheckpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock().await;
        checkpoints
            .entry(agent_id.to_string())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn delete_checkpoint(&self, agent_id: &str, checkpoint_id: &str) -> Result<bool> {
        let mut checkpoints = self.checkpoints.lock().await;
        let Some(entry) = checkpoints.get_mut(agent_id) else {
            return Ok(false);
        };
        let before = entry.len();
        entry.retain(|c| c.checkpoint_id != checkpoint_id);
        Ok(entry.len() < before)
    }

    async fn delete_checkpoints(&self, agent_id: &str) -> Result<usize> {
        let mut checkpoints = self.checkpoints.lock().await;
        Ok(checkpoints.remove(agent_id).map(|v| v.len()).unwrap_or(0))
    }
}

/// File-backed storage: one JSON blob per checkpoint under
/// `<root>/<agent_id>/<checkpoint_id>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn agent_dir(&self, agent_id: &str) -> PathBuf {
        self.root.join(agent_id)
    }

    fn checkpoint_path(&self, agent_id: &str, checkpoint_id: &str) -> PathBuf {
        self.agent_dir(agent_id).join(format!("{checkpoint_id}.json"))
    }

    async fn read_checkpoint(path: &Path) -> Option<AgentCheckpoint> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "checkpoint read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => Some(checkpoint),
            Err(err) => {
                // Corrupt files are skipped rather than failing the whole
                // restore query.
                tracing::warn!(path = %path.display(), error = %err, "checkpoint parse failed");
                None
            }
        }
    }
}

#[async_trait]
impl CheckpointStorage for FileStorage {
    async fn get_checkpoints(&self, agent_id: &str) -> Result<Vec<AgentCheckpoint>> {
        let dir = self.agent_dir(agent_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(checkpoint) = Self::read_checkpoint(&path).await {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by_key(|c| c.created_at);
        Ok(checkpoints)
    }

    async fn save(&self, agent_id: &str, checkpoint: &AgentCheckpoint) -> Result<()> {
        let dir = self.agent_dir(agent_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = self.checkpoint_path(agent_id, &checkpoint.checkpoint_id);
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(agent_id, checkpoint_id = %checkpoint.checkpoint_id, "checkpoint saved");
        Ok(())
    }

    async fn delete_checkpoint(&self, agent_id: &str, checkpoint_id: &str) -> Result<bool> {
        let path = self.checkpoint_path(agent_id, checkpoint_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_checkpoints(&self, agent_id: &str) -> Result<usize> {
        let dir = self.agent_dir(agent_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        let _ = tokio::fs::remove_dir(&dir).await;
        Ok(removed)
    }
}
