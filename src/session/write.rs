//! Write session: every successful request appends the assistant turn.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::structured::{instruction_message, parse_structured, StructuredResponse};
use super::{build_request, RequestMode};
use crate::client::ChatClient;
use crate::error::{AgentError, Result};
use crate::tools::ToolDescriptor;
use crate::types::{ChatMessage, ChatResult, Prompt, StreamChunk, ToolResult};

/// A session that owns the live conversation. After any successful request
/// the prompt ends with the newest assistant turn, tool-call markers included;
/// no request completes without mutating state.
pub struct WriteSession {
    client: Arc<dyn ChatClient>,
    prompt: Prompt,
    tools: Vec<ToolDescriptor>,
    closed: bool,
}

impl WriteSession {
    pub fn new(client: Arc<dyn ChatClient>, prompt: Prompt, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            client,
            prompt,
            tools,
            closed: false,
        }
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn set_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.tools = tools;
    }

    /// Fork a read-only view of the current conversation over the same client.
    pub fn fork_read(&self) -> super::ReadSession {
        super::ReadSession::new(self.client.clone(), self.prompt.clone(), self.tools.clone())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(AgentError::SessionClosed);
        }
        Ok(())
    }

    fn append_assistant_turn(&mut self, result: &ChatResult) {
        let message =
            ChatMessage::assistant_with_tool_calls(result.content.clone(), result.tool_calls.clone());
        self.prompt = self.prompt.clone().with_message(message);
    }

    async fn perform(&mut self, mode: RequestMode) -> Result<ChatResult> {
        self.ensure_open()?;
        let request = build_request(&self.prompt, &self.tools, mode);
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "llm request"
        );
        let result = self.client.chat_with_usage(&request).await?;
        self.append_assistant_turn(&result);
        Ok(result)
    }

    pub async fn request_llm(&mut self) -> Result<ChatResult> {
        self.perform(RequestMode::Default).await
    }

    pub async fn request_llm_without_tools(&mut self) -> Result<ChatResult> {
        self.perform(RequestMode::WithoutTools).await
    }

    pub async fn request_llm_only_calling_tools(&mut self) -> Result<ChatResult> {
        self.perform(RequestMode::OnlyCallingTools).await
    }

    pub async fn request_llm_force_one_tool(&mut self, name: &str) -> Result<ChatResult> {
        self.perform(RequestMode::ForceOneTool(name.to_string())).await
    }

    /// Issue `n` requests in sequence; every assistant turn is appended in
    /// arrival order.
    pub async fn request_llm_multiple(&mut self, n: usize) -> Result<Vec<ChatResult>> {
        let mut results = Vec::with_capacity(n);
        for _ in 0..n {
            results.push(self.perform(RequestMode::Default).await?);
        }
        Ok(results)
    }

    pub async fn request_llm_stream(
        &mut self,
        on_chunk: impl Fn(&str) + Send + Sync,
        on_thinking: impl Fn(&str) + Send + Sync,
    ) -> Result<ChatResult> {
        self.ensure_open()?;
        let request = build_request(&self.prompt, &self.tools, RequestMode::Default);
        let sink = move |chunk: StreamChunk| match chunk {
            StreamChunk::Text { text } => on_chunk(&text),
            StreamChunk::Thinking { text } => on_thinking(&text),
        };
        let result: ChatResult = self
            .client
            .chat_stream_with_usage(&request, &sink)
            .await?
            .into();
        self.append_assistant_turn(&result);
        Ok(result)
    }

    /// Structured request: the instruction block and the assistant response
    /// both land in the prompt, like any other write-session turn.
    pub async fn request_llm_structured<T: DeserializeOwned>(
        &mut self,
        schema: serde_json::Value,
        examples: Vec<serde_json::Value>,
    ) -> Result<StructuredResponse<T>> {
        self.ensure_open()?;
        self.prompt = self
            .prompt
            .clone()
            .with_message(instruction_message(&schema, &examples));
        let raw = self.perform(RequestMode::WithoutTools).await?;
        let parsed = parse_structured(&raw.content);
        Ok(StructuredResponse { raw, parsed })
    }

    /// Side request used by summarizing compression strategies: never touches
    /// the live prompt.
    pub(crate) async fn summarize(&self, instruction: &str, transcript: String) -> Result<String> {
        self.ensure_open()?;
        let prompt = Prompt::new(self.prompt.model())
            .with_message(ChatMessage::system(instruction))
            .with_message(ChatMessage::user(transcript));
        let request = build_request(&prompt, &[], RequestMode::WithoutTools);
        self.client.chat(&request).await
    }

    // -- Prompt editing primitives --

    pub fn append_prompt(&mut self, messages: Vec<ChatMessage>) {
        self.prompt = self.prompt.clone().with_messages(messages);
    }

    /// Append a batch of tool results as tool messages, in result order.
    pub fn append_tool_results(&mut self, results: &[ToolResult]) {
        let messages = results.iter().map(ChatMessage::tool_result).collect();
        self.append_prompt(messages);
    }

    /// Replace the whole prompt. Used by history compression and planner
    /// persona transitions.
    pub fn rewrite_prompt(&mut self, rewrite: impl FnOnce(Prompt) -> Prompt) {
        let current = std::mem::take(&mut self.prompt);
        self.prompt = rewrite(current);
    }

    /// Remove every message, system included.
    pub fn clear_history(&mut self) {
        self.rewrite_prompt(|p| p.with_replaced_messages(Vec::new()));
    }

    pub fn leave_last_n_messages(&mut self, n: usize, preserve_system: bool) {
        self.rewrite_prompt(|p| p.keeping_last_n(n, preserve_system));
    }

    pub fn drop_last_n_messages(&mut self, n: usize) {
        self.rewrite_prompt(|p| p.dropping_last_n(n));
    }

    pub fn leave_messages_from_timestamp(&mut self, ts: DateTime<Utc>, preserve_system: bool) {
        self.rewrite_prompt(|p| p.keeping_from_timestamp(ts, preserve_system));
    }

    pub fn drop_trailing_tool_calls(&mut self) {
        self.rewrite_prompt(|p| p.dropping_trailing_tool_calls());
    }

    /// Close the session and release the client. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.client.close().await
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                model = %self.prompt.model(),
                "write session dropped without close; client connection may leak"
            );
        }
    }
}

impl std::fmt::Debug for WriteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSession")
            .field("model", &self.prompt.model())
            .field("messages", &self.prompt.messages().len())
            .field("closed", &self.closed)
            .finish()
    }
}
