//! History compression strategies.
//!
//! Policies for shrinking conversation history between agent-loop iterations.
//! `should_compress` is a pure predicate over the current message list and a
//! token estimator; `compress` performs the rewrite through the session.

use crate::error::Result;
use crate::session::WriteSession;
use crate::types::ChatMessage;

/// Fixed per-message overhead added by the heuristic estimator.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation transcript. \
    Keep every fact, decision, and open task that later turns may depend on. \
    Respond with the summary only.";

/// Token estimation used for compression decisions.
///
/// The default heuristic (chars/4 plus a fixed per-message overhead) is a
/// deliberate approximation; deployments wanting provider-accurate counts
/// substitute their own estimator.
pub trait TokenEstimator: Send + Sync {
    fn estimate_text(&self, text: &str) -> usize;

    fn estimate_message(&self, message: &ChatMessage) -> usize {
        let mut tokens = MESSAGE_OVERHEAD_TOKENS + self.estimate_text(&message.content);
        for call in &message.tool_calls {
            tokens += self.estimate_text(&call.name) + self.estimate_text(&call.arguments);
        }
        tokens
    }

    fn estimate_messages(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

/// chars/4, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate_text(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Pluggable history compression policy.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressionStrategy {
    /// Fully re-summarize the whole history every time.
    WholeHistory,
    /// Compress only when the estimate exceeds `threshold * max_tokens`.
    TokenBudget { max_tokens: usize, threshold: f64 },
    /// Keep only the last `n` messages; no summarization.
    FromLastNMessages { n: usize, preserve_system: bool },
    /// Summarize in fixed-size chunks, one summary message per chunk.
    Chunked { chunk_size: usize },
}

impl CompressionStrategy {
    /// Short name used in strategy lifecycle events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WholeHistory => "whole_history",
            Self::TokenBudget { .. } => "token_budget",
            Self::FromLastNMessages { .. } => "from_last_n_messages",
            Self::Chunked { .. } => "chunked",
        }
    }

    /// Pure predicate: does the current history warrant compression?
    pub fn should_compress(
        &self,
        messages: &[ChatMessage],
        estimator: &dyn TokenEstimator,
    ) -> bool {
        let non_system = messages.iter().filter(|m| !m.is_system()).count();
        match self {
            Self::WholeHistory => non_system > 1,
            Self::TokenBudget { max_tokens, threshold } => {
                let budget = (*max_tokens as f64 * threshold) as usize;
                estimator.estimate_messages(messages) > budget
            }
            Self::FromLastNMessages { n, .. } => messages.len() > *n,
            Self::Chunked { chunk_size } => non_system >= *chunk_size,
        }
    }

    /// Rewrite the session's prompt according to this policy.
    pub async fn compress(
        &self,
        session: &mut WriteSession,
        estimator: &dyn TokenEstimator,
    ) -> Result<()> {
        let before = session.prompt().messages().len();
        match self {
            Self::FromLastNMessages { n, preserve_system } => {
                session.leave_last_n_messages(*n, *preserve_system);
            }
            Self::WholeHistory => {
                let (system, rest) = split_system(session.prompt().messages());
                let summary = session
                    .summarize(SUMMARY_INSTRUCTION, render_transcript(&rest))
                    .await?;
                session.rewrite_prompt(|p| {
                    p.with_replaced_messages(rebuild(system, vec![summary]))
                });
            }
            Self::TokenBudget { max_tokens, .. } => {
                let (system, rest) = split_system(session.prompt().messages());
                // Keep a recent tail worth a quarter of the budget; summarize
                // everything older.
                let cut = cut_index(&rest, max_tokens / 4, estimator);
                let (head, tail) = rest.split_at(cut);
                if head.is_empty() {
                    return Ok(());
                }
                let summary = session
                    .summarize(SUMMARY_INSTRUCTION, render_transcript(head))
                    .await?;
                let tail = tail.to_vec();
                session.rewrite_prompt(|p| {
                    let mut messages = rebuild(system, vec![summary]);
                    messages.extend(tail);
                    p.with_replaced_messages(messages)
                });
            }
            Self::Chunked { chunk_size } => {
                let (system, rest) = split_system(session.prompt().messages());
                let mut summaries = Vec::new();
                for chunk in rest.chunks((*chunk_size).max(1)) {
                    summaries.push(
                        session
                            .summarize(SUMMARY_INSTRUCTION, render_transcript(chunk))
                            .await?,
                    );
                }
                session.rewrite_prompt(|p| p.with_replaced_messages(rebuild(system, summaries)));
            }
        }
        tracing::debug!(
            strategy = self.name(),
            before,
            after = session.prompt().messages().len(),
            "history compressed"
        );
        Ok(())
    }
}

fn split_system(messages: &[ChatMessage]) -> (Vec<ChatMessage>, Vec<ChatMessage>) {
    let (system, rest): (Vec<_>, Vec<_>) = messages.iter().cloned().partition(|m| m.is_system());
    (system, rest)
}

fn rebuild(system: Vec<ChatMessage>, summaries: Vec<String>) -> Vec<ChatMessage> {
    let mut messages = system;
    for summary in summaries {
        messages.push(ChatMessage::assistant(format!(
            "Summary of earlier conversation:\n{summary}"
        )));
    }
    messages
}

/// Index of the first message kept verbatim: scan from the end until the kept
/// tail exceeds `keep_recent_tokens`. The cut never lands on a tool-result
/// message; a kept tail starting with tool results would orphan them from the
/// assistant turn that issued the calls.
fn cut_index(
    messages: &[ChatMessage],
    keep_recent_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> usize {
    let mut cut = messages.len();
    if keep_recent_tokens > 0 {
        let mut kept = 0usize;
        for idx in (0..messages.len()).rev() {
            kept += estimator.estimate_message(&messages[idx]);
            if kept > keep_recent_tokens {
                break;
            }
            cut = idx;
        }
    }
    while messages.get(cut).is_some_and(|m| m.role == crate::types::Role::Tool) {
        cut += 1;
    }
    cut
}

fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&message.role.to_string());
        out.push_str(": ");
        out.push_str(&message.content);
        for call in &message.tool_calls {
            out.push_str(&format!("\n  [tool call {}({})]", call.name, call.arguments));
        }
        out.push('\n');
    }
    out
}
