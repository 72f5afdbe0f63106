//! Built-in rule set.

use crate::contracts::{ParameterRule, PolicyRule};
use crate::decision::{PolicyDecision, RiskLevel};

/// Tool names treated as read-only by the built-in rules.
pub const READ_ONLY_TOOLS: &[&str] = &[
    "read-file",
    "file",
    "list-dir",
    "dir",
    "grep",
    "search",
    "rev",
];

/// Matches `..` as a whole path segment.
const PATH_TRAVERSAL: &str = r"(?:.*[/\\])?\.\.(?:[/\\].*)?";

/// Returns the built-in rules:
///
/// * `workspace-writes`: file writes allowed at medium risk, denied when the
///   `path` parameter walks out with `..`;
/// * `process-execution`: `shell` and `run` allowed at high risk;
/// * `vcs-commit`: `commit` allowed at medium risk;
/// * `read-only-tools`: read-only tools allowed at low risk.
///
/// # Panics
///
/// Panics only if a built-in pattern fails to compile.
#[must_use]
pub fn default_rules() -> Vec<PolicyRule> {
    let traversal_guard = ParameterRule::new("path")
        .and_then(|rule| rule.with_value_pattern(PATH_TRAVERSAL))
        .expect("built-in traversal pattern is valid")
        .forbidden();

    let rules = [
        PolicyRule::new(
            "workspace-writes",
            "write-file|write|patch",
            PolicyDecision::Allow,
            RiskLevel::Medium,
        )
        .map(|rule| {
            rule.with_description("file writes stay inside the workspace")
                .with_priority(20)
                .with_parameter_rule(traversal_guard)
        }),
        PolicyRule::new(
            "process-execution",
            "shell|run",
            PolicyDecision::Allow,
            RiskLevel::High,
        )
        .map(|rule| {
            rule.with_description("runs a process in the workspace")
                .with_priority(10)
        }),
        PolicyRule::new("vcs-commit", "commit", PolicyDecision::Allow, RiskLevel::Medium)
            .map(|rule| rule.with_description("records a commit").with_priority(10)),
        PolicyRule::new(
            "read-only-tools",
            &READ_ONLY_TOOLS.join("|"),
            PolicyDecision::Allow,
            RiskLevel::Low,
        )
        .map(|rule| rule.with_description("read-only tool")),
    ];

    rules
        .into_iter()
        .map(|rule| rule.expect("built-in policy rule is valid"))
        .collect()
}

#[cfg(test)]
mod tests {
    use devins_primitives::ToolCall;

    use super::*;
    use crate::engine::RulePolicyEngine;

    fn write(path: &str) -> ToolCall {
        ToolCall::new("write-file").unwrap().with_param("path", path)
    }

    #[test]
    fn default_rules_cover_builtin_tools() {
        let engine = RulePolicyEngine::with_default_rules();

        for tool in READ_ONLY_TOOLS {
            let decision = engine.evaluate(&ToolCall::new(*tool).unwrap());
            assert!(decision.is_allow(), "{tool}");
            assert_eq!(decision.risk_level(), RiskLevel::Low, "{tool}");
        }

        let run = engine.evaluate(&ToolCall::new("run").unwrap());
        assert_eq!(run.risk_level(), RiskLevel::High);
        assert_eq!(run.rule_name(), Some("process-execution"));
    }

    #[test]
    fn traversal_guard_only_blocks_parent_segments() {
        let engine = RulePolicyEngine::with_default_rules();

        let denied = engine.evaluate(&write("../../etc/passwd"));
        assert!(denied.is_deny());
        assert_eq!(denied.risk_level(), RiskLevel::Critical);

        assert!(engine.evaluate(&write("src/../../x")).is_deny());
        assert!(engine.evaluate(&write("src/x.txt")).is_allow());
        assert!(engine.evaluate(&write("notes..txt")).is_allow());
        assert!(engine.evaluate(&write("src\\..\\x")).is_deny());
        assert!(engine.evaluate(&write("..")).is_deny());
        assert_eq!(
            engine.evaluate(&write("src/x.txt")).risk_level(),
            RiskLevel::Medium
        );
    }
}
