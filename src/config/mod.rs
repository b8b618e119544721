//! Agent configuration.
//!
//! Plain injected structs; hosts construct one explicitly and pass it down.
//! There is deliberately no process-wide configuration state in the core.

use bon::Builder;

/// Configuration for an [`AgentExecutor`](crate::agent::AgentExecutor).
#[derive(Debug, Clone, Builder)]
pub struct AgentConfig {
    /// Stable identifier used for checkpoints and events.
    #[builder(into, default = "agent".to_string())]
    pub agent_id: String,
    /// Cap on LLM requests per run before the loop reports exhaustion.
    #[builder(default = 10)]
    pub max_iterations: usize,
    /// Execute a tool-call batch concurrently instead of sequentially.
    /// Results are appended in call order either way.
    #[builder(default = false)]
    pub parallel_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: "agent".to_string(),
            max_iterations: 10,
            parallel_tools: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let config = AgentConfig::builder().agent_id("jasmine").build();
        assert_eq!(config.agent_id, "jasmine");
        assert_eq!(config.max_iterations, 10);
        assert!(!config.parallel_tools);
    }
}
