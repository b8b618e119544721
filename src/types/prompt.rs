//! Immutable conversation state sent to a model.

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::ChatMessage;

/// How the model is allowed to use tools for a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides whether to call tools.
    #[default]
    Auto,
    /// Tools are withheld from the request.
    None,
    /// Model must call at least one tool.
    Required,
    /// Model must call this specific tool.
    Specific { name: String },
}

/// Sampling parameters forwarded to the provider.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
    pub max_tokens: Option<u32>,
}

/// Full conversation state: ordered messages plus request configuration.
///
/// `Prompt` is an immutable value. Every edit returns a new `Prompt`; sessions
/// own the current value and swap it atomically, which keeps read sessions
/// trivially side-effect-free.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Prompt {
    messages: Vec<ChatMessage>,
    model: String,
    tool_choice: ToolChoice,
    params: SamplingParams,
}

impl Prompt {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            model: model.into(),
            tool_choice: ToolChoice::Auto,
            params: SamplingParams::default(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tool_choice(&self) -> &ToolChoice {
        &self.tool_choice
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// First system message, if any.
    pub fn system_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.is_system())
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Replace the whole message list. Used by history compression and the
    /// planner's persona transitions.
    pub fn with_replaced_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    /// Keep only the last `n` messages. With `preserve_system`, the first
    /// system message survives even when it falls outside the window.
    pub fn keeping_last_n(self, n: usize, preserve_system: bool) -> Self {
        let system = preserve_system.then(|| self.system_message().cloned()).flatten();
        let start = self.messages.len().saturating_sub(n);
        let mut kept: Vec<ChatMessage> = self.messages[start..].to_vec();
        if let Some(system) = system {
            if !kept.iter().any(|m| m.is_system()) {
                kept.insert(0, system);
            }
        }
        self.with_replaced_messages(kept)
    }

    /// Drop the last `n` messages.
    pub fn dropping_last_n(mut self, n: usize) -> Self {
        let keep = self.messages.len().saturating_sub(n);
        self.messages.truncate(keep);
        self
    }

    /// Keep only messages stamped at or after `ts`. Messages without a
    /// timestamp are dropped.
    pub fn keeping_from_timestamp(self, ts: DateTime<Utc>, preserve_system: bool) -> Self {
        let system = preserve_system.then(|| self.system_message().cloned()).flatten();
        let mut kept: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.timestamp.is_some_and(|t| t >= ts))
            .cloned()
            .collect();
        if let Some(system) = system {
            if !kept.iter().any(|m| m.is_system()) {
                kept.insert(0, system);
            }
        }
        self.with_replaced_messages(kept)
    }

    /// Remove a trailing unfinished tool exchange: tool-result messages at the
    /// tail, then the assistant message that issued those calls. Used to
    /// repair prompts restored mid-iteration.
    pub fn dropping_trailing_tool_calls(mut self) -> Self {
        while self
            .messages
            .last()
            .is_some_and(|m| m.role == super::message::Role::Tool)
        {
            self.messages.pop();
        }
        if self.messages.last().is_some_and(|m| m.has_tool_calls()) {
            self.messages.pop();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::{Role, ToolCall};
    use pretty_assertions::assert_eq;

    fn sample() -> Prompt {
        Prompt::new("test-model")
            .with_message(ChatMessage::system("sys"))
            .with_message(ChatMessage::user("one"))
            .with_message(ChatMessage::assistant("two"))
            .with_message(ChatMessage::user("three"))
    }

    #[test]
    fn edits_return_new_values() {
        let prompt = sample();
        let extended = prompt.clone().with_message(ChatMessage::user("four"));
        assert_eq!(prompt.messages().len(), 4);
        assert_eq!(extended.messages().len(), 5);
    }

    #[test]
    fn keeping_last_n_preserves_system_outside_window() {
        let trimmed = sample().keeping_last_n(2, true);
        let roles: Vec<Role> = trimmed.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant, Role::User]);
    }

    #[test]
    fn keeping_last_n_without_preserve_drops_system() {
        let trimmed = sample().keeping_last_n(1, false);
        assert_eq!(trimmed.messages().len(), 1);
        assert_eq!(trimmed.messages()[0].content, "three");
    }

    #[test]
    fn keeping_last_n_survives_any_n() {
        // The system message survives regardless of how small the window is.
        let trimmed = sample().keeping_last_n(0, true);
        assert_eq!(trimmed.messages().len(), 1);
        assert!(trimmed.messages()[0].is_system());
    }

    #[test]
    fn keeping_from_timestamp_drops_older_and_untimestamped_messages() {
        let cutoff = chrono::Utc::now();
        let mut old = ChatMessage::user("stale");
        old.timestamp = Some(cutoff - chrono::Duration::seconds(60));
        let mut untimestamped = ChatMessage::user("imported");
        untimestamped.timestamp = None;
        let prompt = Prompt::new("test-model")
            .with_message(old)
            .with_message(untimestamped)
            .with_message(ChatMessage::user("fresh"))
            .keeping_from_timestamp(cutoff, false);
        assert_eq!(prompt.messages().len(), 1);
        assert_eq!(prompt.messages()[0].content, "fresh");
    }

    #[test]
    fn keeping_from_timestamp_reinserts_an_older_system_message() {
        let cutoff = chrono::Utc::now();
        let mut system = ChatMessage::system("sys");
        system.timestamp = Some(cutoff - chrono::Duration::seconds(60));
        let prompt = Prompt::new("test-model")
            .with_message(system)
            .with_message(ChatMessage::user("fresh"))
            .keeping_from_timestamp(cutoff, true);
        let roles: Vec<Role> = prompt.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
    }

    #[test]
    fn dropping_trailing_tool_calls_removes_unfinished_exchange() {
        let call = ToolCall::new("c1", "search", "{}");
        let result = crate::types::message::ToolResult::success(&call, "hit");
        let prompt = sample()
            .with_message(ChatMessage::assistant_with_tool_calls("", vec![call]))
            .with_message(ChatMessage::tool_result(&result))
            .dropping_trailing_tool_calls();
        assert_eq!(prompt.messages().len(), 4);
        assert_eq!(prompt.messages().last().map(|m| m.content.as_str()), Some("three"));
    }

    #[test]
    fn dropping_trailing_tool_calls_keeps_clean_tail() {
        let prompt = sample().dropping_trailing_tool_calls();
        assert_eq!(prompt.messages().len(), 4);
    }
}
