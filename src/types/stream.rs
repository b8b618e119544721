//! Streaming chunk and result types.

use serde::{Deserialize, Serialize};

use super::message::ToolCall;
use super::result::{ChatResult, FinishReason};
use super::usage::TokenUsage;

/// One frame of a streamed model response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Text { text: String },
    Thinking { text: String },
}

/// Aggregated output of a streamed turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamResult {
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl From<ChatResult> for StreamResult {
    fn from(result: ChatResult) -> Self {
        Self {
            content: result.content,
            usage: result.usage,
            finish_reason: result.finish_reason,
            tool_calls: result.tool_calls,
        }
    }
}

impl From<StreamResult> for ChatResult {
    fn from(result: StreamResult) -> Self {
        Self {
            content: result.content,
            usage: result.usage,
            finish_reason: result.finish_reason,
            tool_calls: result.tool_calls,
            thinking: None,
        }
    }
}
