//! Name-keyed tool registry and batch execution.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use super::tool::{Tool, ToolDescriptor};
use crate::types::{ToolCall, ToolResult};

/// Name-keyed map of tools. Tools are registered once during construction and
/// only looked up afterwards, so the registry is shared via `Arc` without
/// locking.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces the
    /// earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.descriptor().clone())
            .collect()
    }

    /// Execute one call. Unknown tools, malformed argument JSON, and execution
    /// failures all become error-content results fed back to the model; this
    /// method never fails.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            tracing::warn!(tool = %call.name, call_id = %call.id, "tool not found");
            return ToolResult::failure(call, format!("tool '{}' not found", call.name));
        };
        if serde_json::from_str::<serde_json::Value>(&call.arguments).is_err() {
            tracing::warn!(tool = %call.name, call_id = %call.id, "malformed tool arguments");
            return ToolResult::validation_error(
                call,
                format!("arguments for '{}' are not valid JSON", call.name),
            );
        }
        match tool.execute(&call.arguments).await {
            Ok(content) => ToolResult::success(call, content),
            Err(err) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %err, "tool failed");
                ToolResult::failure(call, err)
            }
        }
    }

    /// Execute a batch sequentially, in call order.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }

    /// Execute a batch concurrently. Results are returned in the original
    /// call order, not completion order, so prompt/call correspondence stays
    /// deterministic.
    pub async fn execute_all_parallel(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.order).finish()
    }
}
