//! Model turn results.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ToolCall;
use super::usage::TokenUsage;

/// Content-marker placed in exhaustion results; hosts and tests match on it.
pub const MAX_ITERATIONS_MARKER: &str = "max_iterations";

/// Why a model turn finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    /// The agent loop hit its iteration cap without a terminal response.
    MaxIterations,
    Error,
}

/// One model turn's output.
///
/// Kept flat for caller ergonomics; [`ChatResult::response`] exposes the same
/// data as a tagged view for exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResult {
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Tagged view over a [`ChatResult`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LlmResponse<'a> {
    Text(&'a str),
    ToolCalls(&'a [ToolCall]),
}

impl ChatResult {
    /// A plain text turn.
    pub fn text(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage,
            finish_reason: FinishReason::Stop,
            tool_calls: Vec::new(),
            thinking: None,
        }
    }

    /// A tool-calling turn.
    pub fn with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        usage: TokenUsage,
    ) -> Self {
        Self {
            content: content.into(),
            usage,
            finish_reason: FinishReason::ToolCalls,
            tool_calls,
            thinking: None,
        }
    }

    /// Terminal result for an exhausted agent loop. Reported as data so
    /// callers inspect content and finish reason instead of catching errors.
    pub fn exhausted(max_iterations: usize, usage: TokenUsage) -> Self {
        Self {
            content: format!(
                "Error: agent loop did not terminate within {max_iterations} iterations ({MAX_ITERATIONS_MARKER})"
            ),
            usage,
            finish_reason: FinishReason::MaxIterations,
            tool_calls: Vec::new(),
            thinking: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Tagged view: a turn is either text or a batch of tool calls.
    pub fn response(&self) -> LlmResponse<'_> {
        if self.has_tool_calls() {
            LlmResponse::ToolCalls(&self.tool_calls)
        } else {
            LlmResponse::Text(&self.content)
        }
    }
}
