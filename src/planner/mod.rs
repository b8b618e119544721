//! LLM-driven planner: plan, execute step by step, replan on failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::events::{
    EventDispatcher, SubgraphExecutionCompletedContext, SubgraphExecutionFailedContext,
    SubgraphExecutionStartingContext,
};
use crate::session::WriteSession;
use crate::types::ChatMessage;

const PLANNING_PERSONA: &str = "You are a planning assistant. Break the user's goal into a \
    short ordered list of concrete, independently executable steps. Keep steps small and \
    verifiable.";

/// One step of a plan. Completion is marked in place by index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
}

/// A goal with an ordered list of steps. Mutated in place as steps complete;
/// replaced wholesale on replanning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimplePlan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
}

impl SimplePlan {
    pub fn new(goal: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self { goal: goal.into(), steps }
    }

    /// Index of the first incomplete step.
    pub fn first_incomplete(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.is_completed)
    }

    pub fn mark_completed(&mut self, index: usize) {
        if let Some(step) = self.steps.get_mut(index) {
            step.is_completed = true;
        }
    }

    pub fn is_completed(&self) -> bool {
        self.steps.iter().all(|s| s.is_completed)
    }

    /// JSON schema for structured plan requests.
    pub fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "goal": { "type": "string" },
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": { "type": "string" },
                            "is_completed": { "type": "boolean" }
                        },
                        "required": ["description"]
                    }
                }
            },
            "required": ["goal", "steps"]
        })
    }

    /// Few-shot example paired with the schema.
    pub fn example() -> serde_json::Value {
        serde_json::json!({
            "goal": "publish the release notes",
            "steps": [
                { "description": "collect merged changes since the last tag", "is_completed": false },
                { "description": "draft the notes and post them", "is_completed": false }
            ]
        })
    }

    /// Render the plan as a checklist for the execution persona.
    fn checklist(&self) -> String {
        let mut out = format!("Goal: {}\nPlan:\n", self.goal);
        for step in &self.steps {
            let mark = if step.is_completed { "x" } else { " " };
            out.push_str(&format!("- [{mark}] {}\n", step.description));
        }
        out
    }
}

/// Whether to keep executing the current plan or rewrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAssessment {
    NoPlan,
    Continue,
    Replan,
}

/// Result of a planner run.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Option<SimplePlan>,
    pub step_outputs: Vec<String>,
    /// False when the planner hit its own iteration cap first.
    pub completed: bool,
}

/// Plan/execute/replan loop over a write session. Bounded by its own
/// `max_iterations`, independent of the tool loop's cap.
pub struct Planner {
    max_iterations: usize,
    dispatcher: Arc<EventDispatcher>,
}

impl Planner {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            dispatcher: Arc::new(EventDispatcher::default()),
        }
    }

    pub fn with_events(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Default assessment: replan after a failure, continue while a plan
    /// exists, otherwise plan from scratch.
    pub fn assess_plan(
        &self,
        plan: Option<&SimplePlan>,
        last_failure: Option<&str>,
    ) -> PlanAssessment {
        match (plan, last_failure) {
            (None, _) => PlanAssessment::NoPlan,
            (Some(_), Some(_)) => PlanAssessment::Replan,
            (Some(_), None) => PlanAssessment::Continue,
        }
    }

    /// Run until the plan completes or `max_iterations` planner turns elapse.
    pub async fn run(&self, session: &mut WriteSession, goal: &str) -> Result<PlanOutcome> {
        let run_id = Uuid::new_v4();
        let mut plan: Option<SimplePlan> = None;
        let mut failure: Option<String> = None;
        let mut step_outputs = Vec::new();

        for _ in 0..self.max_iterations {
            match self.assess_plan(plan.as_ref(), failure.as_deref()) {
                PlanAssessment::NoPlan | PlanAssessment::Replan => {
                    let context = failure.take();
                    plan = Some(
                        self.build_plan(session, run_id, goal, context.as_deref())
                            .await?,
                    );
                }
                PlanAssessment::Continue => {}
            }

            let current = match plan.as_mut() {
                Some(plan) => plan,
                None => return Err(AgentError::InvalidState("planner produced no plan".into())),
            };

            match self.execute_step(session, run_id, current).await {
                Ok(Some(output)) => {
                    step_outputs.push(output);
                    if current.is_completed() {
                        return Ok(PlanOutcome { plan, step_outputs, completed: true });
                    }
                }
                Ok(None) => {
                    return Ok(PlanOutcome { plan, step_outputs, completed: true });
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(run_id = %run_id, error = %err, "step failed; replanning");
                    failure = Some(err.to_string());
                }
                Err(err) => return Err(err),
            }
        }

        tracing::warn!(run_id = %run_id, max_iterations = self.max_iterations, "planner exhausted");
        Ok(PlanOutcome { plan, step_outputs, completed: false })
    }

    /// Rewrite to the planning persona, request a structured plan, then
    /// rewrite to the execution persona embedding the plan and preserving
    /// prior non-system messages as context.
    async fn build_plan(
        &self,
        session: &mut WriteSession,
        run_id: Uuid,
        goal: &str,
        failure_context: Option<&str>,
    ) -> Result<SimplePlan> {
        self.dispatcher.subgraph_execution_starting(SubgraphExecutionStartingContext {
            run_id,
            subgraph_name: "planning".to_string(),
            input: goal.to_string(),
        });

        let prior: Vec<ChatMessage> = session
            .prompt()
            .messages()
            .iter()
            .filter(|m| !m.is_system())
            .cloned()
            .collect();

        let mut persona = PLANNING_PERSONA.to_string();
        if let Some(failure) = failure_context {
            persona.push_str(&format!(
                "\n\nA previous plan for this goal failed: {failure}\nProduce a revised plan that avoids the failure."
            ));
        }
        session.rewrite_prompt(|p| {
            p.with_replaced_messages(vec![
                ChatMessage::system(persona),
                ChatMessage::user(format!("Goal: {goal}")),
            ])
        });

        let plan = match self.request_plan(session).await {
            Ok(plan) => plan,
            Err(err) => {
                self.dispatcher.subgraph_execution_failed(SubgraphExecutionFailedContext {
                    run_id,
                    subgraph_name: "planning".to_string(),
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let checklist = plan.checklist();
        session.rewrite_prompt(|p| {
            let mut messages = vec![ChatMessage::system(format!(
                "You are executing a previously agreed plan, one step at a time.\n\n{checklist}"
            ))];
            messages.extend(prior);
            p.with_replaced_messages(messages)
        });

        self.dispatcher.subgraph_execution_completed(SubgraphExecutionCompletedContext {
            run_id,
            subgraph_name: "planning".to_string(),
            output: checklist,
        });
        Ok(plan)
    }

    /// Structured plan request with a single retry; a second malformed
    /// response is a planning error.
    async fn request_plan(&self, session: &mut WriteSession) -> Result<SimplePlan> {
        for attempt in 0..2 {
            let response = session
                .request_llm_structured::<SimplePlan>(SimplePlan::schema(), vec![SimplePlan::example()])
                .await?;
            match response.parsed {
                Ok(plan) if !plan.steps.is_empty() => return Ok(plan),
                Ok(_) => {
                    tracing::warn!(attempt, "planner returned an empty plan");
                }
                Err(error) => {
                    tracing::warn!(attempt, %error, "plan response did not parse");
                }
            }
        }
        Err(AgentError::Planning("no usable plan after retry".to_string()))
    }

    /// Execute the first incomplete step with a tool-free request and mark it
    /// completed. Returns `None` when every step is already done.
    async fn execute_step(
        &self,
        session: &mut WriteSession,
        run_id: Uuid,
        plan: &mut SimplePlan,
    ) -> Result<Option<String>> {
        let Some(index) = plan.first_incomplete() else {
            return Ok(None);
        };
        let description = plan.steps[index].description.clone();
        let subgraph_name = format!("step:{index}");
        self.dispatcher.subgraph_execution_starting(SubgraphExecutionStartingContext {
            run_id,
            subgraph_name: subgraph_name.clone(),
            input: description.clone(),
        });

        session.append_prompt(vec![ChatMessage::user(format!(
            "Execute this step of the plan and report the outcome: {description}"
        ))]);
        match session.request_llm_without_tools().await {
            Ok(result) => {
                plan.mark_completed(index);
                self.dispatcher.subgraph_execution_completed(SubgraphExecutionCompletedContext {
                    run_id,
                    subgraph_name,
                    output: result.content.clone(),
                });
                Ok(Some(result.content))
            }
            Err(err) => {
                self.dispatcher.subgraph_execution_failed(SubgraphExecutionFailedContext {
                    run_id,
                    subgraph_name,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> SimplePlan {
        SimplePlan::new(
            "ship it",
            vec![
                PlanStep { description: "write code".into(), is_completed: true },
                PlanStep { description: "write tests".into(), is_completed: false },
            ],
        )
    }

    #[test]
    fn first_incomplete_skips_done_steps() {
        assert_eq!(plan().first_incomplete(), Some(1));
    }

    #[test]
    fn completion_is_all_steps() {
        let mut plan = plan();
        assert!(!plan.is_completed());
        plan.mark_completed(1);
        assert!(plan.is_completed());
    }

    #[test]
    fn assessment_defaults() {
        let planner = Planner::new(3);
        assert_eq!(planner.assess_plan(None, None), PlanAssessment::NoPlan);
        assert_eq!(planner.assess_plan(Some(&plan()), None), PlanAssessment::Continue);
        assert_eq!(planner.assess_plan(Some(&plan()), Some("boom")), PlanAssessment::Replan);
    }

    #[test]
    fn checklist_marks_completed_steps() {
        let rendered = plan().checklist();
        assert!(rendered.contains("- [x] write code"));
        assert!(rendered.contains("- [ ] write tests"));
    }

    #[test]
    fn plan_deserializes_without_completion_flags() {
        let parsed: SimplePlan = serde_json::from_value(SimplePlan::example()).expect("parse");
        assert_eq!(parsed.steps.len(), 2);
        assert!(!parsed.steps[0].is_completed);
    }
}
