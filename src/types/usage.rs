//! Token usage accounting.

use serde::{Deserialize, Serialize};

/// Token usage for one or more model turns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates() {
        let mut usage = TokenUsage::new(10, 5);
        usage.merge(&TokenUsage::new(7, 3));
        assert_eq!(usage.prompt_tokens, 17);
        assert_eq!(usage.completion_tokens, 8);
        assert_eq!(usage.total_tokens, 25);
    }
}
