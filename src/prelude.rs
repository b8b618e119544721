//! Common imports for hosts of the agent core.

pub use crate::agent::AgentExecutor;
pub use crate::checkpoint::{
    AgentCheckpoint, CheckpointStorage, FileStorage, InMemoryStorage, Persistence,
    RollbackStrategy,
};
pub use crate::client::{ChatClient, ChatRequest, ModelInfo};
pub use crate::compression::{CompressionStrategy, HeuristicEstimator, TokenEstimator};
pub use crate::config::AgentConfig;
pub use crate::error::{AgentError, Result};
pub use crate::events::{line_event_handler, EventCategory, EventDispatcher, EventHandler};
pub use crate::planner::{PlanOutcome, PlanStep, Planner, SimplePlan};
pub use crate::session::{ReadSession, StructuredResponse, WriteSession};
pub use crate::tools::{FnTool, Tool, ToolDescriptor, ToolRegistry};
pub use crate::types::{
    ChatMessage, ChatResult, FinishReason, LlmResponse, Prompt, Role, SamplingParams, StreamChunk,
    TokenUsage, ToolCall, ToolChoice, ToolResult, ToolResultKind,
};
