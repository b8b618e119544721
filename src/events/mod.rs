//! Typed lifecycle events and their dispatch.
//!
//! A pure observer layer: the executor fires immutable context records into an
//! [`EventDispatcher`], which invokes the registered handler synchronously on
//! the calling task. No queueing, no backpressure; handlers must not block
//! materially. A category filter selects which groups are wired up, with the
//! empty filter meaning "everything".

use std::collections::HashSet;
use std::sync::Arc;

use strum::{Display, EnumString};
use uuid::Uuid;

use crate::types::{StreamChunk, TokenUsage, ToolCall};

/// Event category, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventCategory {
    Agent,
    LlmCall,
    LlmStreaming,
    NodeExecution,
    SubgraphExecution,
    Strategy,
    ToolCall,
}

// -- Context records ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AgentStartingContext {
    pub agent_id: String,
    pub run_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct AgentCompletedContext {
    pub agent_id: String,
    pub run_id: Uuid,
    pub result: String,
}

#[derive(Debug, Clone)]
pub struct AgentExecutionFailedContext {
    pub agent_id: String,
    pub run_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct AgentClosingContext {
    pub agent_id: String,
    pub run_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct LlmCallStartingContext {
    pub run_id: Uuid,
    pub model: String,
    pub message_count: usize,
}

#[derive(Debug, Clone)]
pub struct LlmCallCompletedContext {
    pub run_id: Uuid,
    pub model: String,
    pub content: String,
    pub tool_calls: usize,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone)]
pub struct LlmStreamingStartingContext {
    pub run_id: Uuid,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct LlmStreamingFrameContext {
    pub run_id: Uuid,
    pub frame: StreamChunk,
}

#[derive(Debug, Clone)]
pub struct LlmStreamingFailedContext {
    pub run_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct LlmStreamingCompletedContext {
    pub run_id: Uuid,
    pub frames: usize,
}

#[derive(Debug, Clone)]
pub struct NodeExecutionStartingContext {
    pub run_id: Uuid,
    pub node_name: String,
    pub input: String,
}

#[derive(Debug, Clone)]
pub struct NodeExecutionCompletedContext {
    pub run_id: Uuid,
    pub node_name: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct NodeExecutionFailedContext {
    pub run_id: Uuid,
    pub node_name: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct SubgraphExecutionStartingContext {
    pub run_id: Uuid,
    pub subgraph_name: String,
    pub input: String,
}

#[derive(Debug, Clone)]
pub struct SubgraphExecutionCompletedContext {
    pub run_id: Uuid,
    pub subgraph_name: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct SubgraphExecutionFailedContext {
    pub run_id: Uuid,
    pub subgraph_name: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct StrategyStartingContext {
    pub run_id: Uuid,
    pub strategy_name: String,
}

#[derive(Debug, Clone)]
pub struct StrategyCompletedContext {
    pub run_id: Uuid,
    pub strategy_name: String,
    pub result: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolCallStartingContext {
    pub run_id: Uuid,
    pub call: ToolCall,
}

#[derive(Debug, Clone)]
pub struct ToolValidationFailedContext {
    pub run_id: Uuid,
    pub call: ToolCall,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ToolCallFailedContext {
    pub run_id: Uuid,
    pub call: ToolCall,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ToolCallCompletedContext {
    pub run_id: Uuid,
    pub call: ToolCall,
    pub result: String,
}

// -- Handler -----------------------------------------------------------------

type Handler<C> = Box<dyn Fn(&C) + Send + Sync>;

/// One optional handler slot per event kind; every slot defaults to a no-op.
/// Built with the `on_*` registration methods.
#[derive(Default)]
pub struct EventHandler {
    agent_starting: Option<Handler<AgentStartingContext>>,
    agent_completed: Option<Handler<AgentCompletedContext>>,
    agent_execution_failed: Option<Handler<AgentExecutionFailedContext>>,
    agent_closing: Option<Handler<AgentClosingContext>>,
    llm_call_starting: Option<Handler<LlmCallStartingContext>>,
    llm_call_completed: Option<Handler<LlmCallCompletedContext>>,
    llm_streaming_starting: Option<Handler<LlmStreamingStartingContext>>,
    llm_streaming_frame_received: Option<Handler<LlmStreamingFrameContext>>,
    llm_streaming_failed: Option<Handler<LlmStreamingFailedContext>>,
    llm_streaming_completed: Option<Handler<LlmStreamingCompletedContext>>,
    node_execution_starting: Option<Handler<NodeExecutionStartingContext>>,
    node_execution_completed: Option<Handler<NodeExecutionCompletedContext>>,
    node_execution_failed: Option<Handler<NodeExecutionFailedContext>>,
    subgraph_execution_starting: Option<Handler<SubgraphExecutionStartingContext>>,
    subgraph_execution_completed: Option<Handler<SubgraphExecutionCompletedContext>>,
    subgraph_execution_failed: Option<Handler<SubgraphExecutionFailedContext>>,
    strategy_starting: Option<Handler<StrategyStartingContext>>,
    strategy_completed: Option<Handler<StrategyCompletedContext>>,
    tool_call_starting: Option<Handler<ToolCallStartingContext>>,
    tool_validation_failed: Option<Handler<ToolValidationFailedContext>>,
    tool_call_failed: Option<Handler<ToolCallFailedContext>>,
    tool_call_completed: Option<Handler<ToolCallCompletedContext>>,
}

macro_rules! register {
    ($method:ident, $slot:ident, $ctx:ty) => {
        pub fn $method(mut self, f: impl Fn(&$ctx) + Send + Sync + 'static) -> Self {
            self.$slot = Some(Box::new(f));
            self
        }
    };
}

impl EventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    register!(on_agent_starting, agent_starting, AgentStartingContext);
    register!(on_agent_completed, agent_completed, AgentCompletedContext);
    register!(on_agent_execution_failed, agent_execution_failed, AgentExecutionFailedContext);
    register!(on_agent_closing, agent_closing, AgentClosingContext);
    register!(on_llm_call_starting, llm_call_starting, LlmCallStartingContext);
    register!(on_llm_call_completed, llm_call_completed, LlmCallCompletedContext);
    register!(on_llm_streaming_starting, llm_streaming_starting, LlmStreamingStartingContext);
    register!(
        on_llm_streaming_frame_received,
        llm_streaming_frame_received,
        LlmStreamingFrameContext
    );
    register!(on_llm_streaming_failed, llm_streaming_failed, LlmStreamingFailedContext);
    register!(on_llm_streaming_completed, llm_streaming_completed, LlmStreamingCompletedContext);
    register!(on_node_execution_starting, node_execution_starting, NodeExecutionStartingContext);
    register!(on_node_execution_completed, node_execution_completed, NodeExecutionCompletedContext);
    register!(on_node_execution_failed, node_execution_failed, NodeExecutionFailedContext);
    register!(
        on_subgraph_execution_starting,
        subgraph_execution_starting,
        SubgraphExecutionStartingContext
    );
    register!(
        on_subgraph_execution_completed,
        subgraph_execution_completed,
        SubgraphExecutionCompletedContext
    );
    register!(
        on_subgraph_execution_failed,
        subgraph_execution_failed,
        SubgraphExecutionFailedContext
    );
    register!(on_strategy_starting, strategy_starting, StrategyStartingContext);
    register!(on_strategy_completed, strategy_completed, StrategyCompletedContext);
    register!(on_tool_call_starting, tool_call_starting, ToolCallStartingContext);
    register!(on_tool_validation_failed, tool_validation_failed, ToolValidationFailedContext);
    register!(on_tool_call_failed, tool_call_failed, ToolCallFailedContext);
    register!(on_tool_call_completed, tool_call_completed, ToolCallCompletedContext);
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler").finish_non_exhaustive()
    }
}

// -- Dispatcher --------------------------------------------------------------

macro_rules! fire {
    ($method:ident, $slot:ident, $category:expr, $ctx:ty) => {
        pub fn $method(&self, ctx: $ctx) {
            if !self.enabled($category) {
                return;
            }
            if let Some(handler) = &self.handler.$slot {
                handler(&ctx);
            }
        }
    };
}

/// Wraps an [`EventHandler`] with a category filter and fires events inline.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    handler: EventHandler,
    filter: HashSet<EventCategory>,
}

impl EventDispatcher {
    /// An empty `filter` enables every category.
    pub fn new(handler: EventHandler, filter: HashSet<EventCategory>) -> Self {
        Self { handler, filter }
    }

    pub fn unfiltered(handler: EventHandler) -> Self {
        Self::new(handler, HashSet::new())
    }

    fn enabled(&self, category: EventCategory) -> bool {
        self.filter.is_empty() || self.filter.contains(&category)
    }

    fire!(agent_starting, agent_starting, EventCategory::Agent, AgentStartingContext);
    fire!(agent_completed, agent_completed, EventCategory::Agent, AgentCompletedContext);
    fire!(
        agent_execution_failed,
        agent_execution_failed,
        EventCategory::Agent,
        AgentExecutionFailedContext
    );
    fire!(agent_closing, agent_closing, EventCategory::Agent, AgentClosingContext);
    fire!(llm_call_starting, llm_call_starting, EventCategory::LlmCall, LlmCallStartingContext);
    fire!(llm_call_completed, llm_call_completed, EventCategory::LlmCall, LlmCallCompletedContext);
    fire!(
        llm_streaming_starting,
        llm_streaming_starting,
        EventCategory::LlmStreaming,
        LlmStreamingStartingContext
    );
    fire!(
        llm_streaming_frame_received,
        llm_streaming_frame_received,
        EventCategory::LlmStreaming,
        LlmStreamingFrameContext
    );
    fire!(
        llm_streaming_failed,
        llm_streaming_failed,
        EventCategory::LlmStreaming,
        LlmStreamingFailedContext
    );
    fire!(
        llm_streaming_completed,
        llm_streaming_completed,
        EventCategory::LlmStreaming,
        LlmStreamingCompletedContext
    );
    fire!(
        node_execution_starting,
        node_execution_starting,
        EventCategory::NodeExecution,
        NodeExecutionStartingContext
    );
    fire!(
        node_execution_completed,
        node_execution_completed,
        EventCategory::NodeExecution,
        NodeExecutionCompletedContext
    );
    fire!(
        node_execution_failed,
        node_execution_failed,
        EventCategory::NodeExecution,
        NodeExecutionFailedContext
    );
    fire!(
        subgraph_execution_starting,
        subgraph_execution_starting,
        EventCategory::SubgraphExecution,
        SubgraphExecutionStartingContext
    );
    fire!(
        subgraph_execution_completed,
        subgraph_execution_completed,
        EventCategory::SubgraphExecution,
        SubgraphExecutionCompletedContext
    );
    fire!(
        subgraph_execution_failed,
        subgraph_execution_failed,
        EventCategory::SubgraphExecution,
        SubgraphExecutionFailedContext
    );
    fire!(strategy_starting, strategy_starting, EventCategory::Strategy, StrategyStartingContext);
    fire!(
        strategy_completed,
        strategy_completed,
        EventCategory::Strategy,
        StrategyCompletedContext
    );
    fire!(tool_call_starting, tool_call_starting, EventCategory::ToolCall, ToolCallStartingContext);
    fire!(
        tool_validation_failed,
        tool_validation_failed,
        EventCategory::ToolCall,
        ToolValidationFailedContext
    );
    fire!(tool_call_failed, tool_call_failed, EventCategory::ToolCall, ToolCallFailedContext);
    fire!(
        tool_call_completed,
        tool_call_completed,
        EventCategory::ToolCall,
        ToolCallCompletedContext
    );
}

// -- Line sink ---------------------------------------------------------------

/// Host-supplied plain-text event sink.
pub type LineSink = Arc<dyn Fn(String) + Send + Sync>;

/// Build a handler that renders every event kind as one line into `sink`.
/// This is how hosts without a typed event consumer (a log view, a notification
/// tray) observe agent progress.
pub fn line_event_handler(sink: LineSink) -> EventHandler {
    macro_rules! emit {
        (|$ctx:ident| $($arg:tt)*) => {{
            let sink = sink.clone();
            move |$ctx: &_| sink(format!($($arg)*))
        }};
    }
    EventHandler::new()
        .on_agent_starting(emit!(|ctx| "agent {} starting (run {})", ctx.agent_id, ctx.run_id))
        .on_agent_completed(emit!(|ctx| "agent {} completed: {}", ctx.agent_id, ctx.result))
        .on_agent_execution_failed(emit!(|ctx| "agent {} failed: {}", ctx.agent_id, ctx.error))
        .on_agent_closing(emit!(|ctx| "agent {} closing", ctx.agent_id))
        .on_llm_call_starting(
            emit!(|ctx| "llm call starting: {} ({} messages)", ctx.model, ctx.message_count),
        )
        .on_llm_call_completed(emit!(
            |ctx| "llm call completed: {} ({} tool calls, {} tokens)",
            ctx.model,
            ctx.tool_calls,
            ctx.usage.total_tokens
        ))
        .on_llm_streaming_starting(emit!(|ctx| "llm streaming starting: {}", ctx.model))
        .on_llm_streaming_frame_received(emit!(|ctx| "llm streaming frame (run {})", ctx.run_id))
        .on_llm_streaming_failed(emit!(|ctx| "llm streaming failed: {}", ctx.error))
        .on_llm_streaming_completed(emit!(|ctx| "llm streaming completed ({} frames)", ctx.frames))
        .on_node_execution_starting(emit!(|ctx| "node {} starting", ctx.node_name))
        .on_node_execution_completed(emit!(|ctx| "node {} completed", ctx.node_name))
        .on_node_execution_failed(emit!(|ctx| "node {} failed: {}", ctx.node_name, ctx.error))
        .on_subgraph_execution_starting(emit!(|ctx| "subgraph {} starting", ctx.subgraph_name))
        .on_subgraph_execution_completed(emit!(|ctx| "subgraph {} completed", ctx.subgraph_name))
        .on_subgraph_execution_failed(
            emit!(|ctx| "subgraph {} failed: {}", ctx.subgraph_name, ctx.error),
        )
        .on_strategy_starting(emit!(|ctx| "strategy {} starting", ctx.strategy_name))
        .on_strategy_completed(emit!(|ctx| "strategy {} completed", ctx.strategy_name))
        .on_tool_call_starting(
            emit!(|ctx| "tool {} starting (call {})", ctx.call.name, ctx.call.id),
        )
        .on_tool_validation_failed(
            emit!(|ctx| "tool {} validation failed: {}", ctx.call.name, ctx.error),
        )
        .on_tool_call_failed(emit!(|ctx| "tool {} failed: {}", ctx.call.name, ctx.error))
        .on_tool_call_completed(emit!(|ctx| "tool {} completed", ctx.call.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn counting_handler(hits: Arc<Mutex<Vec<&'static str>>>) -> EventHandler {
        let agent_hits = hits.clone();
        let tool_hits = hits;
        EventHandler::new()
            .on_agent_starting(move |_| agent_hits.lock().expect("lock").push("agent"))
            .on_tool_call_starting(move |_| tool_hits.lock().expect("lock").push("tool"))
    }

    fn agent_ctx() -> AgentStartingContext {
        AgentStartingContext { agent_id: "a1".into(), run_id: Uuid::new_v4() }
    }

    fn tool_ctx() -> ToolCallStartingContext {
        ToolCallStartingContext {
            run_id: Uuid::new_v4(),
            call: ToolCall::new("c1", "calc", "{}"),
        }
    }

    #[test]
    fn filter_blocks_other_categories() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = EventDispatcher::new(
            counting_handler(hits.clone()),
            HashSet::from([EventCategory::ToolCall]),
        );

        dispatcher.agent_starting(agent_ctx());
        dispatcher.tool_call_starting(tool_ctx());

        assert_eq!(*hits.lock().expect("lock"), vec!["tool"]);
    }

    #[test]
    fn empty_filter_enables_all_categories() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = EventDispatcher::unfiltered(counting_handler(hits.clone()));

        dispatcher.agent_starting(agent_ctx());
        dispatcher.tool_call_starting(tool_ctx());

        assert_eq!(*hits.lock().expect("lock"), vec!["agent", "tool"]);
    }

    #[test]
    fn unregistered_slots_are_no_ops() {
        let dispatcher = EventDispatcher::unfiltered(EventHandler::new());
        dispatcher.agent_starting(agent_ctx());
        dispatcher.llm_call_starting(LlmCallStartingContext {
            run_id: Uuid::new_v4(),
            model: "m".into(),
            message_count: 0,
        });
    }

    #[test]
    fn line_handler_renders_events() {
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink_lines = lines.clone();
        let sink: LineSink = Arc::new(move |line| sink_lines.lock().expect("lock").push(line));
        let dispatcher = EventDispatcher::unfiltered(line_event_handler(sink));

        dispatcher.tool_call_starting(tool_ctx());

        let lines = lines.lock().expect("lock");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("tool calc starting"));
    }
}
