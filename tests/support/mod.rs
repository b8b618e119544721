//! Scripted chat client used across integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use jasmine::client::{ChatClient, ChatRequest, ModelInfo};
use jasmine::error::{AgentError, Result};
use jasmine::types::{ChatResult, TokenUsage, ToolCall};

/// One scripted turn: a canned result or a transport failure.
pub type ScriptTurn = std::result::Result<ChatResult, String>;

/// Chat client that replays a fixed script and records every request.
pub struct ScriptedClient {
    script: Vec<ScriptTurn>,
    /// When set, the last script entry repeats forever instead of exhausting.
    repeat_last: bool,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub closed: AtomicBool,
}

impl ScriptedClient {
    pub fn new(script: Vec<ScriptTurn>) -> Arc<Self> {
        Arc::new(Self {
            script,
            repeat_last: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// A client that returns `turn` on every call.
    pub fn repeating(turn: ChatResult) -> Arc<Self> {
        Arc::new(Self {
            script: vec![Ok(turn)],
            repeat_last: true,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("request lock").clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat_with_usage(&self, request: &ChatRequest) -> Result<ChatResult> {
        self.requests.lock().expect("request lock").push(request.clone());
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let turn = if index < self.script.len() {
            &self.script[index]
        } else if self.repeat_last && !self.script.is_empty() {
            &self.script[self.script.len() - 1]
        } else {
            return Err(AgentError::Client(format!("script exhausted at call {index}")));
        };
        match turn {
            Ok(result) => Ok(result.clone()),
            Err(message) => Err(AgentError::Client(message.clone())),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "scripted-model".to_string(),
            display_name: None,
            context_window: Some(8192),
        }])
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn text_turn(content: &str) -> ChatResult {
    ChatResult::text(content, TokenUsage::new(10, 5))
}

pub fn tool_turn(calls: Vec<ToolCall>) -> ChatResult {
    ChatResult::with_tool_calls("", calls, TokenUsage::new(10, 5))
}
