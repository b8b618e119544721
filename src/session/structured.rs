//! Structured-output request path.
//!
//! A schema plus optional few-shot examples are appended as a user instruction
//! block, a tool-free completion is requested, and the response is parsed as
//! JSON. Parse failure is carried in the returned value so the agent loop can
//! recover without catching errors.

use serde::de::DeserializeOwned;

use crate::types::{ChatMessage, ChatResult};

/// Result of a structured request: the raw turn plus the parse outcome.
#[derive(Debug, Clone)]
pub struct StructuredResponse<T> {
    pub raw: ChatResult,
    /// Parsed value, or the parse error message.
    pub parsed: Result<T, String>,
}

impl<T> StructuredResponse<T> {
    pub fn is_parsed(&self) -> bool {
        self.parsed.is_ok()
    }
}

/// Build the instruction block appended before a structured request.
pub(crate) fn instruction_message(
    schema: &serde_json::Value,
    examples: &[serde_json::Value],
) -> ChatMessage {
    let mut text = String::from(
        "Respond with a single JSON object and nothing else. \
         The object must conform to this JSON schema:\n",
    );
    text.push_str(&serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string()));
    if !examples.is_empty() {
        text.push_str("\n\nExamples of valid responses:");
        for example in examples {
            text.push('\n');
            text.push_str(&example.to_string());
        }
    }
    ChatMessage::user(text)
}

/// Parse a model response as JSON, tolerating markdown code fences and
/// surrounding prose.
pub(crate) fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, String> {
    let candidate = extract_json(content);
    serde_json::from_str(candidate).map_err(|err| err.to_string())
}

fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(stripped) = strip_code_fence(trimmed) {
        return stripped;
    }
    // Fall back to the outermost braces when the model added prose.
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```")?;
    Some(rest.trim())
}
