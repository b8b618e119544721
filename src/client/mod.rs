//! Chat client contract implemented by provider adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tools::ToolDescriptor;
use crate::types::{ChatMessage, ChatResult, SamplingParams, StreamChunk, StreamResult, ToolChoice};

/// A model advertised by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
}

/// One chat request as seen by a provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub params: SamplingParams,
    pub tools: Vec<ToolDescriptor>,
    pub tool_choice: ToolChoice,
}

/// Streaming frame callback. Invoked inline on the requesting task.
pub type ChunkSink<'a> = &'a (dyn Fn(StreamChunk) + Send + Sync);

/// Provider-agnostic chat client. Any LLM provider adapter implementing this
/// contract is pluggable into sessions.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One turn, text only.
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        Ok(self.chat_with_usage(request).await?.content)
    }

    /// One turn with usage, finish reason, and tool calls.
    async fn chat_with_usage(&self, request: &ChatRequest) -> Result<ChatResult>;

    /// Streamed turn; frames are delivered through `on_chunk`.
    async fn chat_stream(&self, request: &ChatRequest, on_chunk: ChunkSink<'_>) -> Result<String> {
        Ok(self.chat_stream_with_usage(request, on_chunk).await?.content)
    }

    /// Streamed turn with usage. The default implementation degrades to a
    /// single frame for adapters without native streaming.
    async fn chat_stream_with_usage(
        &self,
        request: &ChatRequest,
        on_chunk: ChunkSink<'_>,
    ) -> Result<StreamResult> {
        let result = self.chat_with_usage(request).await?;
        if let Some(thinking) = &result.thinking {
            on_chunk(StreamChunk::Thinking { text: thinking.clone() });
        }
        if !result.content.is_empty() {
            on_chunk(StreamChunk::Text { text: result.content.clone() });
        }
        Ok(result.into())
    }

    /// Models available from this provider.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Release the underlying connection. Idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
