//! Read-only session: requests never mutate the prompt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::structured::{instruction_message, parse_structured, StructuredResponse};
use super::{build_request, RequestMode};
use crate::client::ChatClient;
use crate::error::{AgentError, Result};
use crate::tools::ToolDescriptor;
use crate::types::{ChatResult, Prompt, StreamChunk};

/// A session whose requests are side-effect-free on the prompt. Useful for
/// fan-out "what-if" queries without disturbing the main conversation.
pub struct ReadSession {
    client: Arc<dyn ChatClient>,
    prompt: Prompt,
    tools: Vec<ToolDescriptor>,
    closed: AtomicBool,
}

impl ReadSession {
    pub fn new(client: Arc<dyn ChatClient>, prompt: Prompt, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            client,
            prompt,
            tools,
            closed: AtomicBool::new(false),
        }
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::SessionClosed);
        }
        Ok(())
    }

    async fn perform(&self, mode: RequestMode) -> Result<ChatResult> {
        self.ensure_open()?;
        let request = build_request(&self.prompt, &self.tools, mode);
        self.client.chat_with_usage(&request).await
    }

    pub async fn request_llm(&self) -> Result<ChatResult> {
        self.perform(RequestMode::Default).await
    }

    pub async fn request_llm_without_tools(&self) -> Result<ChatResult> {
        self.perform(RequestMode::WithoutTools).await
    }

    pub async fn request_llm_only_calling_tools(&self) -> Result<ChatResult> {
        self.perform(RequestMode::OnlyCallingTools).await
    }

    pub async fn request_llm_force_one_tool(&self, name: &str) -> Result<ChatResult> {
        self.perform(RequestMode::ForceOneTool(name.to_string())).await
    }

    /// Fan out `n` independent requests over the same prompt.
    pub async fn request_llm_multiple(&self, n: usize) -> Result<Vec<ChatResult>> {
        let mut results = Vec::with_capacity(n);
        for _ in 0..n {
            results.push(self.perform(RequestMode::Default).await?);
        }
        Ok(results)
    }

    pub async fn request_llm_stream(
        &self,
        on_chunk: impl Fn(&str) + Send + Sync,
        on_thinking: impl Fn(&str) + Send + Sync,
    ) -> Result<ChatResult> {
        self.ensure_open()?;
        let request = build_request(&self.prompt, &self.tools, RequestMode::Default);
        let sink = move |chunk: StreamChunk| match chunk {
            StreamChunk::Text { text } => on_chunk(&text),
            StreamChunk::Thinking { text } => on_thinking(&text),
        };
        let result = self.client.chat_stream_with_usage(&request, &sink).await?;
        Ok(result.into())
    }

    pub async fn request_llm_structured<T: DeserializeOwned>(
        &self,
        schema: serde_json::Value,
        examples: Vec<serde_json::Value>,
    ) -> Result<StructuredResponse<T>> {
        self.ensure_open()?;
        let prompt = self
            .prompt
            .clone()
            .with_message(instruction_message(&schema, &examples));
        let request = build_request(&prompt, &self.tools, RequestMode::WithoutTools);
        let raw = self.client.chat_with_usage(&request).await?;
        let parsed = parse_structured(&raw.content);
        Ok(StructuredResponse { raw, parsed })
    }

    /// Close the session and release the client. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client.close().await
    }
}

impl std::fmt::Debug for ReadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadSession")
            .field("model", &self.prompt.model())
            .field("messages", &self.prompt.messages().len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
