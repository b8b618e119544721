//! The agent loop: alternate LLM requests and tool execution until the model
//! answers in plain text or the iteration cap is hit.
//!
//! The loop is a state machine over {Requesting, ExecutingTools, Done,
//! Exhausted}. Exhaustion is reported as a terminal [`ChatResult`] carrying
//! the `max_iterations` marker, never as an error; individual tool failures
//! are folded into the conversation as error content.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::checkpoint::{AgentCheckpoint, Persistence};
use crate::compression::{CompressionStrategy, HeuristicEstimator, TokenEstimator};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::events::{
    AgentClosingContext, AgentCompletedContext, AgentExecutionFailedContext, AgentStartingContext,
    EventDispatcher, LlmCallCompletedContext, LlmCallStartingContext, LlmStreamingCompletedContext,
    LlmStreamingFailedContext, LlmStreamingFrameContext, LlmStreamingStartingContext,
    NodeExecutionCompletedContext, NodeExecutionFailedContext, NodeExecutionStartingContext,
    StrategyCompletedContext, StrategyStartingContext, ToolCallCompletedContext,
    ToolCallFailedContext, ToolCallStartingContext, ToolValidationFailedContext,
};
use crate::session::WriteSession;
use crate::tools::ToolRegistry;
use crate::types::{
    ChatMessage, ChatResult, StreamChunk, TokenUsage, ToolCall, ToolResult, ToolResultKind,
};

type StreamSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Drives the tool-call loop for one agent.
pub struct AgentExecutor {
    config: AgentConfig,
    registry: Arc<ToolRegistry>,
    compression: Option<CompressionStrategy>,
    estimator: Arc<dyn TokenEstimator>,
    dispatcher: Arc<EventDispatcher>,
    persistence: Option<Persistence>,
}

impl AgentExecutor {
    pub fn new(config: AgentConfig, registry: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            registry,
            compression: None,
            estimator: Arc::new(HeuristicEstimator),
            dispatcher: Arc::new(EventDispatcher::default()),
            persistence: None,
        }
    }

    pub fn with_compression(mut self, strategy: CompressionStrategy) -> Self {
        self.compression = Some(strategy);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_events(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Run the loop to completion. The session is always closed before this
    /// returns, success or not.
    pub async fn run(&self, session: &mut WriteSession, input: &str) -> Result<ChatResult> {
        self.run_inner(session, input, None).await
    }

    /// Streaming variant: assistant text frames are forwarded to `on_chunk`
    /// as they arrive.
    pub async fn run_streaming(
        &self,
        session: &mut WriteSession,
        input: &str,
        on_chunk: impl Fn(&str) + Send + Sync,
    ) -> Result<ChatResult> {
        self.run_inner(session, input, Some(&on_chunk)).await
    }

    async fn run_inner(
        &self,
        session: &mut WriteSession,
        input: &str,
        stream: Option<StreamSink<'_>>,
    ) -> Result<ChatResult> {
        let run_id = Uuid::new_v4();
        let agent_id = self.config.agent_id.clone();
        self.dispatcher.agent_starting(AgentStartingContext {
            agent_id: agent_id.clone(),
            run_id,
        });
        tracing::debug!(agent_id = %agent_id, run_id = %run_id, "agent run starting");

        let checkpoint_base = session.prompt().messages().len();
        session.append_prompt(vec![ChatMessage::user(input)]);

        let outcome = self
            .drive(session, input, run_id, checkpoint_base, stream)
            .await;

        match &outcome {
            Ok(result) => {
                self.dispatcher.agent_completed(AgentCompletedContext {
                    agent_id: agent_id.clone(),
                    run_id,
                    result: result.content.clone(),
                });
            }
            Err(err) => {
                tracing::warn!(agent_id = %agent_id, run_id = %run_id, error = %err, "agent run failed");
                self.dispatcher.agent_execution_failed(AgentExecutionFailedContext {
                    agent_id: agent_id.clone(),
                    run_id,
                    error: err.to_string(),
                });
            }
        }

        // Close on every exit path, then surface the first failure.
        self.dispatcher.agent_closing(AgentClosingContext { agent_id, run_id });
        let closed = session.close().await;
        let result = outcome?;
        closed?;
        Ok(result)
    }

    async fn drive(
        &self,
        session: &mut WriteSession,
        input: &str,
        run_id: Uuid,
        mut checkpointed: usize,
        stream: Option<StreamSink<'_>>,
    ) -> Result<ChatResult> {
        let mut iterations = 0usize;
        let mut usage = TokenUsage::default();

        loop {
            if iterations >= self.config.max_iterations {
                tracing::warn!(
                    run_id = %run_id,
                    max_iterations = self.config.max_iterations,
                    "agent loop exhausted"
                );
                return Ok(ChatResult::exhausted(self.config.max_iterations, usage));
            }
            iterations += 1;

            if let Some(strategy) = &self.compression {
                if strategy.should_compress(session.prompt().messages(), self.estimator.as_ref()) {
                    self.dispatcher.strategy_starting(StrategyStartingContext {
                        run_id,
                        strategy_name: strategy.name().to_string(),
                    });
                    strategy.compress(session, self.estimator.as_ref()).await?;
                    self.dispatcher.strategy_completed(StrategyCompletedContext {
                        run_id,
                        strategy_name: strategy.name().to_string(),
                        result: Some(format!("{} messages kept", session.prompt().messages().len())),
                    });
                    // Compression rewrote the list; earlier indices are void.
                    checkpointed = checkpointed.min(session.prompt().messages().len());
                }
            }

            let node_name = format!("loop:{iterations}");
            self.dispatcher.node_execution_starting(NodeExecutionStartingContext {
                run_id,
                node_name: node_name.clone(),
                input: input.to_string(),
            });

            let result = match self.request(session, run_id, stream).await {
                Ok(result) => result,
                Err(err) => {
                    self.dispatcher.node_execution_failed(NodeExecutionFailedContext {
                        run_id,
                        node_name,
                        error: err.to_string(),
                    });
                    return Err(err);
                }
            };
            usage.merge(&result.usage);

            if !result.has_tool_calls() {
                self.dispatcher.node_execution_completed(NodeExecutionCompletedContext {
                    run_id,
                    node_name: node_name.clone(),
                    output: result.content.clone(),
                });
                self.checkpoint(session, &node_name, input, &mut checkpointed, true).await?;
                let mut terminal = result;
                terminal.usage = usage;
                return Ok(terminal);
            }

            let tool_results = self.execute_tools(run_id, &result.tool_calls).await;
            session.append_tool_results(&tool_results);
            self.dispatcher.node_execution_completed(NodeExecutionCompletedContext {
                run_id,
                node_name: node_name.clone(),
                output: format!("{} tool results", tool_results.len()),
            });
            self.checkpoint(session, &node_name, input, &mut checkpointed, false).await?;
        }
    }

    async fn request(
        &self,
        session: &mut WriteSession,
        run_id: Uuid,
        stream: Option<StreamSink<'_>>,
    ) -> Result<ChatResult> {
        let model = session.prompt().model().to_string();
        self.dispatcher.llm_call_starting(LlmCallStartingContext {
            run_id,
            model: model.clone(),
            message_count: session.prompt().messages().len(),
        });

        let result = match stream {
            None => session.request_llm().await,
            Some(sink) => {
                self.dispatcher.llm_streaming_starting(LlmStreamingStartingContext {
                    run_id,
                    model: model.clone(),
                });
                let frames = AtomicUsize::new(0);
                let result = session
                    .request_llm_stream(
                        |text| {
                            frames.fetch_add(1, Ordering::Relaxed);
                            self.dispatcher.llm_streaming_frame_received(
                                LlmStreamingFrameContext {
                                    run_id,
                                    frame: StreamChunk::Text { text: text.to_string() },
                                },
                            );
                            sink(text);
                        },
                        |text| {
                            frames.fetch_add(1, Ordering::Relaxed);
                            self.dispatcher.llm_streaming_frame_received(
                                LlmStreamingFrameContext {
                                    run_id,
                                    frame: StreamChunk::Thinking { text: text.to_string() },
                                },
                            );
                        },
                    )
                    .await;
                match &result {
                    Ok(_) => {
                        self.dispatcher.llm_streaming_completed(LlmStreamingCompletedContext {
                            run_id,
                            frames: frames.load(Ordering::Relaxed),
                        });
                    }
                    Err(err) => {
                        self.dispatcher.llm_streaming_failed(LlmStreamingFailedContext {
                            run_id,
                            error: err.to_string(),
                        });
                    }
                }
                result
            }
        };

        if let Ok(result) = &result {
            self.dispatcher.llm_call_completed(LlmCallCompletedContext {
                run_id,
                model,
                content: result.content.clone(),
                tool_calls: result.tool_calls.len(),
                usage: result.usage,
            });
        }
        result
    }

    /// Execute a batch, firing per-call lifecycle events. Sequential by
    /// default; the parallel mode races executions and joins results back in
    /// call order.
    async fn execute_tools(&self, run_id: Uuid, calls: &[ToolCall]) -> Vec<ToolResult> {
        let results = if self.config.parallel_tools {
            for call in calls {
                self.dispatcher.tool_call_starting(ToolCallStartingContext {
                    run_id,
                    call: call.clone(),
                });
            }
            self.registry.execute_all_parallel(calls).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                self.dispatcher.tool_call_starting(ToolCallStartingContext {
                    run_id,
                    call: call.clone(),
                });
                results.push(self.registry.execute(call).await);
            }
            results
        };

        for (call, result) in calls.iter().zip(&results) {
            match result.kind {
                ToolResultKind::Success => {
                    self.dispatcher.tool_call_completed(ToolCallCompletedContext {
                        run_id,
                        call: call.clone(),
                        result: result.content.clone(),
                    });
                }
                ToolResultKind::Failure => {
                    self.dispatcher.tool_call_failed(ToolCallFailedContext {
                        run_id,
                        call: call.clone(),
                        error: result.content.clone(),
                    });
                }
                ToolResultKind::ValidationError => {
                    self.dispatcher.tool_validation_failed(ToolValidationFailedContext {
                        run_id,
                        call: call.clone(),
                        error: result.content.clone(),
                    });
                }
            }
        }
        results
    }

    /// Save the message slice produced since the previous checkpoint; on the
    /// terminal step, also write the tombstone.
    async fn checkpoint(
        &self,
        session: &WriteSession,
        node_path: &str,
        input: &str,
        checkpointed: &mut usize,
        terminal: bool,
    ) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        if !persistence.auto_checkpoint {
            return Ok(());
        }
        let messages = session.prompt().messages();
        let slice = messages[(*checkpointed).min(messages.len())..].to_vec();
        *checkpointed = messages.len();
        let checkpoint = AgentCheckpoint::new(node_path, slice, Some(input.to_string()));
        persistence.save(&self.config.agent_id, &checkpoint).await?;
        if terminal {
            persistence
                .save(&self.config.agent_id, &AgentCheckpoint::tombstone(node_path))
                .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("agent_id", &self.config.agent_id)
            .field("max_iterations", &self.config.max_iterations)
            .field("parallel_tools", &self.config.parallel_tools)
            .finish_non_exhaustive()
    }
}
