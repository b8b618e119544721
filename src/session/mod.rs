//! LLM sessions: stateful wrappers around a chat client and a prompt.
//!
//! Two variants share one request surface. [`ReadSession`] never mutates its
//! prompt, which makes it safe for fan-out "what-if" queries; [`WriteSession`]
//! appends every assistant turn to its prompt before returning, so the prompt
//! always reflects the full conversation.

pub mod read;
pub mod structured;
pub mod write;

pub use read::ReadSession;
pub use structured::StructuredResponse;
pub use write::WriteSession;

use crate::client::ChatRequest;
use crate::tools::ToolDescriptor;
use crate::types::{ChatMessage, Prompt, Role, ToolChoice};

/// Per-request tool policy selected by the request method.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RequestMode {
    /// Tools included, model decides.
    Default,
    /// Tools withheld entirely.
    WithoutTools,
    /// Model must call at least one tool.
    OnlyCallingTools,
    /// Model must call this specific tool.
    ForceOneTool(String),
}

/// Build the provider request for a prompt under the given tool policy.
/// Agent-log annotations never leave the process.
pub(crate) fn build_request(
    prompt: &Prompt,
    tools: &[ToolDescriptor],
    mode: RequestMode,
) -> ChatRequest {
    let messages: Vec<ChatMessage> = prompt
        .messages()
        .iter()
        .filter(|m| m.role != Role::AgentLog)
        .cloned()
        .collect();
    let (tools, tool_choice) = match mode {
        RequestMode::Default => (tools.to_vec(), prompt.tool_choice().clone()),
        RequestMode::WithoutTools => (Vec::new(), ToolChoice::None),
        RequestMode::OnlyCallingTools => (tools.to_vec(), ToolChoice::Required),
        RequestMode::ForceOneTool(name) => (tools.to_vec(), ToolChoice::Specific { name }),
    };
    ChatRequest {
        messages,
        model: prompt.model().to_string(),
        params: prompt.params().clone(),
        tools,
        tool_choice,
    }
}
