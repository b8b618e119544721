//! Core data types shared across the agent core.

pub mod message;
pub mod prompt;
pub mod result;
pub mod stream;
pub mod usage;

pub use message::{ChatMessage, Role, ToolCall, ToolResult, ToolResultKind};
pub use prompt::{Prompt, SamplingParams, ToolChoice};
pub use result::{ChatResult, FinishReason, LlmResponse, MAX_ITERATIONS_MARKER};
pub use stream::{StreamChunk, StreamResult};
pub use usage::TokenUsage;
