//! Checkpoints: persisted snapshots of agent progress with rollback support.

pub mod storage;

pub use storage::{CheckpointStorage, FileStorage, InMemoryStorage};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::types::ChatMessage;

/// Format version written into new checkpoints.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A snapshot of agent progress: node position plus the message slice
/// produced since the previous checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCheckpoint {
    pub checkpoint_id: String,
    pub node_path: String,
    pub created_at: DateTime<Utc>,
    pub version: u32,
    pub message_history: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_input: Option<String>,
    /// Marks terminal completion; tombstones are excluded from restore
    /// candidates but still counted for deletion.
    #[serde(default)]
    pub is_tombstone: bool,
}

impl AgentCheckpoint {
    pub fn new(
        node_path: impl Into<String>,
        message_history: Vec<ChatMessage>,
        last_input: Option<String>,
    ) -> Self {
        Self {
            checkpoint_id: Uuid::new_v4().to_string(),
            node_path: node_path.into(),
            created_at: Utc::now(),
            version: CHECKPOINT_VERSION,
            message_history,
            last_input,
            is_tombstone: false,
        }
    }

    /// Terminal marker checkpoint.
    pub fn tombstone(node_path: impl Into<String>) -> Self {
        Self {
            is_tombstone: true,
            ..Self::new(node_path, Vec::new(), None)
        }
    }
}

/// What to do with the interrupted node when resuming from a checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RollbackStrategy {
    /// Re-execute the node the checkpoint points at.
    #[default]
    RestartFromNode,
    /// Resume from the node after the checkpointed one.
    SkipNode,
    /// Resume after the node, substituting its configured default output.
    UseDefaultOutput,
}

/// Checkpoint policy plus a storage provider.
#[derive(Clone)]
pub struct Persistence {
    storage: Arc<dyn CheckpointStorage>,
    pub auto_checkpoint: bool,
    pub rollback_strategy: RollbackStrategy,
}

impl Persistence {
    pub fn new(storage: Arc<dyn CheckpointStorage>) -> Self {
        Self {
            storage,
            auto_checkpoint: false,
            rollback_strategy: RollbackStrategy::default(),
        }
    }

    pub fn with_auto_checkpoint(mut self, enabled: bool) -> Self {
        self.auto_checkpoint = enabled;
        self
    }

    pub fn with_rollback_strategy(mut self, strategy: RollbackStrategy) -> Self {
        self.rollback_strategy = strategy;
        self
    }

    pub async fn save(&self, agent_id: &str, checkpoint: &AgentCheckpoint) -> Result<()> {
        self.storage.save(agent_id, checkpoint).await
    }

    pub async fn get_checkpoints(&self, agent_id: &str) -> Result<Vec<AgentCheckpoint>> {
        self.storage.get_checkpoints(agent_id).await
    }

    pub async fn delete_checkpoint(&self, agent_id: &str, checkpoint_id: &str) -> Result<bool> {
        self.storage.delete_checkpoint(agent_id, checkpoint_id).await
    }

    pub async fn delete_checkpoints(&self, agent_id: &str) -> Result<usize> {
        self.storage.delete_checkpoints(agent_id).await
    }

    /// Latest restore candidate, skipping tombstones.
    pub async fn latest_checkpoint(&self, agent_id: &str) -> Result<Option<AgentCheckpoint>> {
        let checkpoints = self.storage.get_checkpoints(agent_id).await?;
        Ok(checkpoints.into_iter().rev().find(|c| !c.is_tombstone))
    }

    /// The restore chain up to and including `checkpoint_id`, in creation
    /// order, tombstones excluded.
    pub async fn checkpoints_up_to(
        &self,
        agent_id: &str,
        checkpoint_id: &str,
    ) -> Result<Vec<AgentCheckpoint>> {
        let checkpoints = self.storage.get_checkpoints(agent_id).await?;
        let mut chain = Vec::new();
        let mut found = false;
        for checkpoint in checkpoints {
            let is_target = checkpoint.checkpoint_id == checkpoint_id;
            if !checkpoint.is_tombstone {
                chain.push(checkpoint);
            }
            if is_target {
                found = true;
                break;
            }
        }
        if !found {
            return Err(AgentError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        Ok(chain)
    }

    /// Rebuild a full message history from a checkpoint chain: the configured
    /// system prompt first, then each checkpoint's message slice in creation
    /// order. Pure and idempotent.
    pub fn rebuild_history_from_checkpoints(
        checkpoints: &[AgentCheckpoint],
        system_prompt: Option<&str>,
    ) -> Vec<ChatMessage> {
        let mut ordered: Vec<&AgentCheckpoint> =
            checkpoints.iter().filter(|c| !c.is_tombstone).collect();
        ordered.sort_by_key(|c| c.created_at);

        let mut history = Vec::new();
        if let Some(system) = system_prompt {
            history.push(ChatMessage::system(system));
        }
        for checkpoint in ordered {
            history.extend(checkpoint.message_history.iter().cloned());
        }
        history
    }

    /// Restore the message history up to `checkpoint_id`.
    pub async fn restore(
        &self,
        agent_id: &str,
        checkpoint_id: &str,
        system_prompt: Option<&str>,
    ) -> Result<Vec<ChatMessage>> {
        let chain = self.checkpoints_up_to(agent_id, checkpoint_id).await?;
        Ok(Self::rebuild_history_from_checkpoints(&chain, system_prompt))
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("auto_checkpoint", &self.auto_checkpoint)
            .field("rollback_strategy", &self.rollback_strategy)
            .finish_non_exhaustive()
    }
}
