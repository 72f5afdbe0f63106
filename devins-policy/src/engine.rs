//! Policy engine trait and rule-based implementation.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use devins_primitives::{ToolCall, ToolExecutionContext};
use thiserror::Error;
use tracing::{debug, warn};

use crate::contracts::{ParameterCheck, PolicyRule};
use crate::decision::{PolicyDecisionResult, RULE_METADATA_KEY, RiskLevel};
use crate::defaults::default_rules;

/// Errors surfaced while building rules or talking to policy backends.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Rule configuration error.
    #[error("invalid policy rule: {0}")]
    InvalidRule(&'static str),
    /// A tool or value pattern failed to compile.
    #[error("invalid policy pattern: {source}")]
    InvalidPattern {
        /// Source [`regex::Error`].
        #[from]
        source: regex::Error,
    },
    /// Backend integration returned an error.
    #[error("policy backend failure: {reason}")]
    Backend {
        /// Human-readable explanation for logging and operators.
        reason: String,
    },
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Trait implemented by policy engines.
///
/// A permission check always yields a decision; engines that depend on
/// fallible backends must map failures to a decision themselves.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Decides whether `call` may run in `ctx`.
    async fn check_permission(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
    ) -> PolicyDecisionResult;
}

/// Rule-based, in-memory policy engine.
///
/// Rules are kept ordered by descending priority, with equal priorities in
/// registration order. Readers evaluate against an immutable snapshot, so a
/// concurrent update never affects an evaluation already in progress.
#[derive(Debug)]
pub struct RulePolicyEngine {
    rules: RwLock<Arc<Vec<PolicyRule>>>,
    default_decision: PolicyDecisionResult,
}

impl Default for RulePolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RulePolicyEngine {
    /// Creates an engine with no rules that allows unmatched calls at low risk.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            default_decision: PolicyDecisionResult::allow(
                RiskLevel::Low,
                "no policy rule matched; default policy applies",
            ),
        }
    }

    /// Creates an engine preloaded with [`default_rules`].
    #[must_use]
    pub fn with_default_rules() -> Self {
        let engine = Self::new();
        for rule in default_rules() {
            engine.add_rule(rule);
        }
        engine
    }

    /// Replaces the decision returned when no rule matches.
    #[must_use]
    pub fn with_default(mut self, decision: PolicyDecisionResult) -> Self {
        self.default_decision = decision;
        self
    }

    /// Returns the decision applied when no rule matches.
    #[must_use]
    pub fn default_decision(&self) -> &PolicyDecisionResult {
        &self.default_decision
    }

    /// Adds a rule after every existing rule of equal or higher priority.
    ///
    /// # Panics
    ///
    /// Panics if the internal rule store lock has been poisoned.
    pub fn add_rule(&self, rule: PolicyRule) {
        let mut guard = self.rules.write().expect("policy rules poisoned");
        let rules = Arc::make_mut(&mut guard);
        let position = rules.partition_point(|existing| existing.priority() >= rule.priority());
        debug!(rule = rule.name(), priority = rule.priority(), "policy rule added");
        rules.insert(position, rule);
    }

    /// Removes every rule with the given name. Returns `true` if one was removed.
    ///
    /// # Panics
    ///
    /// Panics if the internal rule store lock has been poisoned.
    pub fn remove_rule(&self, name: &str) -> bool {
        let mut guard = self.rules.write().expect("policy rules poisoned");
        if !guard.iter().any(|rule| rule.name() == name) {
            return false;
        }
        Arc::make_mut(&mut guard).retain(|rule| rule.name() != name);
        true
    }

    /// Removes all rules.
    ///
    /// # Panics
    ///
    /// Panics if the internal rule store lock has been poisoned.
    pub fn clear_rules(&self) {
        let mut guard = self.rules.write().expect("policy rules poisoned");
        *guard = Arc::new(Vec::new());
    }

    /// Returns a snapshot of the rules in evaluation order.
    ///
    /// # Panics
    ///
    /// Panics if the internal rule store lock has been poisoned.
    #[must_use]
    pub fn rules(&self) -> Arc<Vec<PolicyRule>> {
        Arc::clone(&self.rules.read().expect("policy rules poisoned"))
    }

    /// Evaluates a call against the current rule snapshot.
    #[must_use]
    pub fn evaluate(&self, call: &ToolCall) -> PolicyDecisionResult {
        let rules = self.rules();
        let tool = call.tool_name();

        for rule in rules.iter().filter(|rule| rule.matches_tool(tool)) {
            match rule.check_parameters(call.params()) {
                ParameterCheck::Fail => {}
                ParameterCheck::Forbidden => {
                    let parameter = rule.forbidden_parameter(call.params()).unwrap_or_default();
                    warn!(rule = rule.name(), tool, parameter, "forbidden parameter value");
                    return PolicyDecisionResult::deny(
                        RiskLevel::Critical,
                        format!(
                            "parameter `{parameter}` of `{tool}` is forbidden by rule `{}`",
                            rule.name()
                        ),
                    )
                    .with_metadata(RULE_METADATA_KEY, rule.name())
                    .with_metadata("parameter", parameter);
                }
                ParameterCheck::Pass => {
                    debug!(rule = rule.name(), tool, decision = %rule.decision(), "policy rule matched");
                    let reason = if rule.description().is_empty() {
                        format!("matched rule `{}`", rule.name())
                    } else {
                        rule.description().to_string()
                    };
                    return PolicyDecisionResult::new(rule.decision(), rule.risk_level(), reason)
                        .with_metadata(RULE_METADATA_KEY, rule.name());
                }
            }
        }

        self.default_decision.clone()
    }
}

#[async_trait]
impl PolicyEngine for RulePolicyEngine {
    async fn check_permission(
        &self,
        call: &ToolCall,
        _ctx: &ToolExecutionContext,
    ) -> PolicyDecisionResult {
        self.evaluate(call)
    }
}

/// Wrapper lowering the risk of unmatched calls to read-only tools.
pub struct ReadOnlyAwareEngine {
    inner: Arc<dyn PolicyEngine>,
    read_only: HashSet<String>,
}

impl ReadOnlyAwareEngine {
    /// Wraps `inner`, treating the listed tools as read-only.
    #[must_use]
    pub fn new<I, S>(inner: Arc<dyn PolicyEngine>, read_only_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            read_only: read_only_tools.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PolicyEngine for ReadOnlyAwareEngine {
    async fn check_permission(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
    ) -> PolicyDecisionResult {
        let result = self.inner.check_permission(call, ctx).await;
        if result.rule_name().is_none() && self.read_only.contains(call.tool_name()) {
            return result
                .with_risk_level(RiskLevel::Low)
                .with_metadata("read_only", "true");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ParameterRule;
    use crate::decision::PolicyDecision;

    fn call(tool: &str, params: &[(&str, &str)]) -> ToolCall {
        params
            .iter()
            .fold(ToolCall::new(tool).unwrap(), |call, (k, v)| call.with_param(*k, *v))
    }

    fn rule(name: &str, pattern: &str, decision: PolicyDecision, priority: i32) -> PolicyRule {
        PolicyRule::new(name, pattern, decision, RiskLevel::Medium)
            .unwrap()
            .with_priority(priority)
    }

    #[tokio::test]
    async fn highest_priority_rule_wins() {
        let engine = RulePolicyEngine::new();
        engine.add_rule(rule("allow-all", ".*", PolicyDecision::Allow, 0));
        engine.add_rule(rule("deny-shell", "shell", PolicyDecision::Deny, 50));
        engine.add_rule(rule("ask-shell", "shell", PolicyDecision::AskUser, 10));

        let ctx = ToolExecutionContext::default();
        let decision = engine.check_permission(&call("shell", &[]), &ctx).await;
        assert!(decision.is_deny());
        assert_eq!(decision.rule_name(), Some("deny-shell"));

        let decision = engine.check_permission(&call("grep", &[]), &ctx).await;
        assert_eq!(decision.rule_name(), Some("allow-all"));
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let engine = RulePolicyEngine::new();
        engine.add_rule(rule("first", "shell|run", PolicyDecision::Allow, 5));
        engine.add_rule(rule("second", "shell", PolicyDecision::Deny, 5));
        engine.add_rule(rule("low", "shell", PolicyDecision::Deny, 1));

        let names: Vec<_> = engine.rules().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, ["first", "second", "low"]);
        assert_eq!(engine.evaluate(&call("shell", &[])).rule_name(), Some("first"));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let engine = RulePolicyEngine::with_default_rules();
        let request = call("write-file", &[("path", "src/a.rs")]);
        assert_eq!(engine.evaluate(&request), engine.evaluate(&request));
    }

    #[test]
    fn default_rules_allow_shell_at_high_risk() {
        let engine = RulePolicyEngine::with_default_rules();
        let decision = engine.evaluate(&call("shell", &[]));
        assert_eq!(decision.decision(), PolicyDecision::Allow);
        assert_eq!(decision.risk_level(), RiskLevel::High);
    }

    #[test]
    fn forbidden_traversal_is_denied() {
        let engine = RulePolicyEngine::new();
        engine.add_rule(
            PolicyRule::new("write-guard", "write-file", PolicyDecision::Allow, RiskLevel::Medium)
                .unwrap()
                .with_parameter_rule(
                    ParameterRule::new("path")
                        .unwrap()
                        .with_value_pattern(r"\.\./.*")
                        .unwrap()
                        .forbidden(),
                ),
        );

        let denied = engine.evaluate(&call("write-file", &[("path", "../../etc/passwd")]));
        assert!(denied.is_deny());
        assert!(denied.risk_level() >= RiskLevel::High);
        assert_eq!(denied.rule_name(), Some("write-guard"));

        let allowed = engine.evaluate(&call("write-file", &[("path", "src/x.txt")]));
        assert!(allowed.is_allow());
    }

    #[test]
    fn failed_parameter_rule_falls_through() {
        let engine = RulePolicyEngine::new().with_default(PolicyDecisionResult::deny(
            RiskLevel::High,
            "closed by default",
        ));
        engine.add_rule(
            rule("needs-path", "read-file", PolicyDecision::Allow, 1)
                .with_parameter_rule(ParameterRule::new("path").unwrap().required()),
        );

        assert!(engine.evaluate(&call("read-file", &[("path", "a")])).is_allow());
        let fallback = engine.evaluate(&call("read-file", &[]));
        assert!(fallback.is_deny());
        assert_eq!(fallback.reason(), "closed by default");
    }

    #[test]
    fn rules_can_be_removed_and_cleared() {
        let engine = RulePolicyEngine::new();
        engine.add_rule(rule("a", "x", PolicyDecision::Deny, 0));
        engine.add_rule(rule("b", "y", PolicyDecision::Deny, 0));

        let snapshot = engine.rules();
        assert!(engine.remove_rule("a"));
        assert!(!engine.remove_rule("a"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(engine.rules().len(), 1);

        engine.clear_rules();
        assert!(engine.rules().is_empty());
        assert!(engine.evaluate(&call("y", &[])).is_allow());
    }

    #[tokio::test]
    async fn read_only_tools_default_to_low_risk() {
        let inner = Arc::new(RulePolicyEngine::new().with_default(PolicyDecisionResult::allow(
            RiskLevel::Medium,
            "default",
        )));
        let engine = ReadOnlyAwareEngine::new(inner, ["read-file"]);
        let ctx = ToolExecutionContext::default();

        let read = engine.check_permission(&call("read-file", &[]), &ctx).await;
        assert_eq!(read.risk_level(), RiskLevel::Low);

        let write = engine.check_permission(&call("write-file", &[]), &ctx).await;
        assert_eq!(write.risk_level(), RiskLevel::Medium);
    }
}
