//! Policy rule contracts.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::decision::{PolicyDecision, RiskLevel};
use crate::engine::{PolicyError, PolicyResult};

/// Outcome of checking one parameter constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParameterCheck {
    Pass,
    Fail,
    Forbidden,
}

/// Constraint on a single tool call parameter.
#[derive(Debug, Clone)]
pub struct ParameterRule {
    parameter_name: String,
    value_pattern: Option<Regex>,
    value_pattern_source: Option<String>,
    required: bool,
    forbidden: bool,
}

impl ParameterRule {
    /// Creates an unconstrained rule for the named parameter.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the name is empty.
    pub fn new(parameter_name: impl Into<String>) -> PolicyResult<Self> {
        let parameter_name = parameter_name.into();
        if parameter_name.trim().is_empty() {
            return Err(PolicyError::InvalidRule("parameter name cannot be empty"));
        }
        Ok(Self {
            parameter_name,
            value_pattern: None,
            value_pattern_source: None,
            required: false,
            forbidden: false,
        })
    }

    /// Requires the value (when present) to match `pattern`, or, for a
    /// forbidden rule, marks matching values as prohibited. Like tool patterns,
    /// the pattern must match the whole value.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] when the pattern does not compile.
    pub fn with_value_pattern(mut self, pattern: &str) -> PolicyResult<Self> {
        self.value_pattern = Some(Regex::new(&format!("^(?:{pattern})$"))?);
        self.value_pattern_source = Some(pattern.to_string());
        Ok(self)
    }

    /// Requires the parameter to be present.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Prohibits the parameter, or with a value pattern, prohibits matching values.
    #[must_use]
    pub fn forbidden(mut self) -> Self {
        self.forbidden = true;
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn parameter_name(&self) -> &str {
        &self.parameter_name
    }

    /// Returns the value pattern source, if any.
    #[must_use]
    pub fn value_pattern(&self) -> Option<&str> {
        self.value_pattern_source.as_deref()
    }

    /// Returns whether the parameter is required.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns whether the parameter is forbidden.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.forbidden
    }

    pub(crate) fn check(&self, params: &BTreeMap<String, String>) -> ParameterCheck {
        let value = params.get(&self.parameter_name);

        if self.forbidden {
            let violated = match (value, &self.value_pattern) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(value), Some(pattern)) => pattern.is_match(value),
            };
            return if violated {
                ParameterCheck::Forbidden
            } else {
                ParameterCheck::Pass
            };
        }

        match value {
            None if self.required => ParameterCheck::Fail,
            None => ParameterCheck::Pass,
            Some(value) => match &self.value_pattern {
                Some(pattern) if !pattern.is_match(value) => ParameterCheck::Fail,
                _ => ParameterCheck::Pass,
            },
        }
    }
}

/// Declarative rule governing whether a tool call is permitted.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    name: String,
    description: String,
    tool_pattern: Regex,
    tool_pattern_source: String,
    parameter_rules: Vec<ParameterRule>,
    decision: PolicyDecision,
    risk_level: RiskLevel,
    priority: i32,
}

impl PolicyRule {
    /// Creates a rule matching tool names against `tool_pattern`. The pattern
    /// must match the whole name.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the name is empty and
    /// [`PolicyError::InvalidPattern`] when the pattern does not compile.
    pub fn new(
        name: impl Into<String>,
        tool_pattern: &str,
        decision: PolicyDecision,
        risk_level: RiskLevel,
    ) -> PolicyResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PolicyError::InvalidRule("rule name cannot be empty"));
        }

        Ok(Self {
            name,
            description: String::new(),
            tool_pattern: Regex::new(&format!("^(?:{tool_pattern})$"))?,
            tool_pattern_source: tool_pattern.to_string(),
            parameter_rules: Vec::new(),
            decision,
            risk_level,
            priority: 0,
        })
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the priority. Higher priorities are evaluated first.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a parameter constraint.
    #[must_use]
    pub fn with_parameter_rule(mut self, rule: ParameterRule) -> Self {
        self.parameter_rules.push(rule);
        self
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the tool pattern as written.
    #[must_use]
    pub fn tool_pattern(&self) -> &str {
        &self.tool_pattern_source
    }

    /// Returns the parameter constraints.
    #[must_use]
    pub fn parameter_rules(&self) -> &[ParameterRule] {
        &self.parameter_rules
    }

    /// Returns the decision applied when the rule matches.
    #[must_use]
    pub fn decision(&self) -> PolicyDecision {
        self.decision
    }

    /// Returns the risk level applied when the rule matches.
    #[must_use]
    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    /// Returns the priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn matches_tool(&self, tool_name: &str) -> bool {
        self.tool_pattern.is_match(tool_name)
    }

    /// Checks every parameter constraint, stopping at the first prohibition.
    pub(crate) fn check_parameters(&self, params: &BTreeMap<String, String>) -> ParameterCheck {
        let mut outcome = ParameterCheck::Pass;
        for rule in &self.parameter_rules {
            match rule.check(params) {
                ParameterCheck::Forbidden => return ParameterCheck::Forbidden,
                ParameterCheck::Fail => outcome = ParameterCheck::Fail,
                ParameterCheck::Pass => {}
            }
        }
        outcome
    }

    pub(crate) fn forbidden_parameter(&self, params: &BTreeMap<String, String>) -> Option<&str> {
        self.parameter_rules
            .iter()
            .find(|rule| rule.check(params) == ParameterCheck::Forbidden)
            .map(ParameterRule::parameter_name)
    }
}

/// Serialisable form of a [`PolicyRule`], used by configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRuleSpec {
    /// Rule name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Tool name pattern.
    pub tool_pattern: String,
    /// Decision when matched.
    pub decision: PolicyDecision,
    /// Risk when matched.
    pub risk_level: RiskLevel,
    /// Evaluation priority.
    #[serde(default)]
    pub priority: i32,
    /// Parameter constraints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterRuleSpec>,
}

/// Serialisable form of a [`ParameterRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRuleSpec {
    /// Parameter name.
    pub name: String,
    /// Optional value pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_pattern: Option<String>,
    /// Whether the parameter is required.
    #[serde(default)]
    pub required: bool,
    /// Whether the parameter (or matching values) is forbidden.
    #[serde(default)]
    pub forbidden: bool,
}

impl TryFrom<&PolicyRuleSpec> for PolicyRule {
    type Error = PolicyError;

    fn try_from(spec: &PolicyRuleSpec) -> PolicyResult<Self> {
        let mut rule = PolicyRule::new(&spec.name, &spec.tool_pattern, spec.decision, spec.risk_level)?
            .with_description(&spec.description)
            .with_priority(spec.priority);

        for param in &spec.parameters {
            let mut constraint = ParameterRule::new(&param.name)?;
            if let Some(pattern) = &param.value_pattern {
                constraint = constraint.with_value_pattern(pattern)?;
            }
            if param.required {
                constraint = constraint.required();
            }
            if param.forbidden {
                constraint = constraint.forbidden();
            }
            rule = rule.with_parameter_rule(constraint);
        }
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn tool_pattern_is_anchored() {
        let rule =
            PolicyRule::new("files", "read-file|file", PolicyDecision::Allow, RiskLevel::Low).unwrap();
        assert!(rule.matches_tool("file"));
        assert!(rule.matches_tool("read-file"));
        assert!(!rule.matches_tool("read-file-fast"));
        assert!(!rule.matches_tool("profile"));
    }

    #[test]
    fn rejects_invalid_rules() {
        assert!(matches!(
            PolicyRule::new(" ", "x", PolicyDecision::Allow, RiskLevel::Low),
            Err(PolicyError::InvalidRule(_))
        ));
        assert!(matches!(
            PolicyRule::new("bad", "(", PolicyDecision::Allow, RiskLevel::Low),
            Err(PolicyError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn parameter_checks() {
        let required = ParameterRule::new("path").unwrap().required();
        assert_eq!(required.check(&params(&[])), ParameterCheck::Fail);
        assert_eq!(required.check(&params(&[("path", "a")])), ParameterCheck::Pass);

        let pattern = ParameterRule::new("path")
            .unwrap()
            .with_value_pattern(r"src/.*")
            .unwrap();
        assert_eq!(pattern.check(&params(&[])), ParameterCheck::Pass);
        assert_eq!(pattern.check(&params(&[("path", "src/a")])), ParameterCheck::Pass);
        assert_eq!(pattern.check(&params(&[("path", "docs/a")])), ParameterCheck::Fail);

        let forbidden = ParameterRule::new("force").unwrap().forbidden();
        assert_eq!(forbidden.check(&params(&[])), ParameterCheck::Pass);
        assert_eq!(
            forbidden.check(&params(&[("force", "true")])),
            ParameterCheck::Forbidden
        );

        let traversal = ParameterRule::new("path")
            .unwrap()
            .with_value_pattern(r"\.\./.*")
            .unwrap()
            .forbidden();
        assert_eq!(traversal.check(&params(&[("path", "src/x.txt")])), ParameterCheck::Pass);
        assert_eq!(
            traversal.check(&params(&[("path", "../../etc/passwd")])),
            ParameterCheck::Forbidden
        );
    }

    #[test]
    fn value_pattern_must_match_whole_value() {
        let scoped = ParameterRule::new("path")
            .unwrap()
            .with_value_pattern(r"src/.*|docs/.*")
            .unwrap();
        assert_eq!(scoped.value_pattern(), Some(r"src/.*|docs/.*"));
        assert_eq!(scoped.check(&params(&[("path", "docs/x")])), ParameterCheck::Pass);
        assert_eq!(scoped.check(&params(&[("path", "evil/src/x")])), ParameterCheck::Fail);

        let secrets = ParameterRule::new("path")
            .unwrap()
            .with_value_pattern(r"\.env")
            .unwrap()
            .forbidden();
        assert_eq!(secrets.check(&params(&[("path", ".env")])), ParameterCheck::Forbidden);
        assert_eq!(secrets.check(&params(&[("path", "prod.env.bak")])), ParameterCheck::Pass);
    }

    #[test]
    fn spec_converts_to_rule() {
        let spec: PolicyRuleSpec = guard_spec();
        let rule = PolicyRule::try_from(&spec).unwrap();
        assert_eq!(rule.name(), "guard");
        assert_eq!(rule.priority(), 5);
        assert_eq!(rule.parameter_rules().len(), 1);
        assert!(rule.parameter_rules()[0].is_forbidden());
        assert_eq!(rule.parameter_rules()[0].value_pattern(), Some(r"\.\."));
    }

    fn guard_spec() -> PolicyRuleSpec {
        PolicyRuleSpec {
            name: "guard".into(),
            description: "no traversal".into(),
            tool_pattern: "write-file".into(),
            decision: PolicyDecision::Allow,
            risk_level: RiskLevel::Medium,
            priority: 5,
            parameters: vec![ParameterRuleSpec {
                name: "path".into(),
                value_pattern: Some(r"\.\.".into()),
                required: false,
                forbidden: true,
            }],
        }
    }
}
