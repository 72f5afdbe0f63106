//! Collaborators the host can plug into a [`Compiler`](crate::Compiler).

use std::sync::Arc;

use async_trait::async_trait;
use devins_policy::{PolicyDecision, PolicyDecisionResult};
use devins_primitives::{ToolCall, ToolExecutionContext};
use devins_tools::ToolResult;
use tracing::{debug, info};

/// Handles `@agent` mentions. LLM calls live behind this trait.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Runs the agent named by `call` and returns the text substituted for
    /// the mention.
    async fn run(&self, call: &ToolCall, context: &ToolExecutionContext) -> ToolResult<String>;
}

/// Observer invoked whenever a policy decision is produced.
pub trait DecisionObserver: Send + Sync {
    /// Records the decision for `call`.
    fn on_decision(&self, call: &ToolCall, decision: &PolicyDecisionResult);
}

/// Observer that writes every decision to the tracing system.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDecisionObserver;

impl DecisionObserver for TracingDecisionObserver {
    fn on_decision(&self, call: &ToolCall, decision: &PolicyDecisionResult) {
        let origin = call.origin();
        match decision.decision() {
            PolicyDecision::Allow => debug!(
                tool = call.tool_name(),
                risk = %decision.risk_level(),
                rule = decision.rule_name(),
                "policy allow"
            ),
            PolicyDecision::Deny | PolicyDecision::AskUser => info!(
                tool = call.tool_name(),
                decision = %decision.decision(),
                risk = %decision.risk_level(),
                rule = decision.rule_name(),
                reason = decision.reason(),
                line = origin.line(),
                column = origin.column(),
                "policy audit"
            ),
        }
    }
}

/// Fans a decision out to several observers.
#[derive(Default)]
pub struct CompositeDecisionObserver {
    observers: Vec<Arc<dyn DecisionObserver>>,
}

impl CompositeDecisionObserver {
    /// Creates a composite from the supplied observers.
    #[must_use]
    pub fn new<I>(observers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn DecisionObserver>>,
    {
        Self {
            observers: observers.into_iter().collect(),
        }
    }

    /// Adds an observer.
    pub fn push(&mut self, observer: Arc<dyn DecisionObserver>) {
        self.observers.push(observer);
    }
}

impl DecisionObserver for CompositeDecisionObserver {
    fn on_decision(&self, call: &ToolCall, decision: &PolicyDecisionResult) {
        for observer in &self.observers {
            observer.on_decision(call, decision);
        }
    }
}
