//! Policy decision types returned by engines.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key naming the rule that produced a decision.
pub const RULE_METADATA_KEY: &str = "rule";

/// Describes the outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyDecision {
    /// Call is permitted without further intervention.
    Allow,
    /// Call is rejected outright.
    Deny,
    /// Call requires confirmation from the user.
    AskUser,
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("ALLOW"),
            Self::Deny => f.write_str("DENY"),
            Self::AskUser => f.write_str("ASK_USER"),
        }
    }
}

/// Ordered risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Read-only or otherwise harmless.
    Low,
    /// Modifies workspace content.
    Medium,
    /// Runs arbitrary processes.
    High,
    /// Escapes the workspace or is destructive.
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("LOW"),
            Self::Medium => f.write_str("MEDIUM"),
            Self::High => f.write_str("HIGH"),
            Self::Critical => f.write_str("CRITICAL"),
        }
    }
}

/// Structured decision emitted by a policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecisionResult {
    decision: PolicyDecision,
    reason: String,
    risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

impl PolicyDecisionResult {
    /// Creates a result from its parts.
    #[must_use]
    pub fn new(decision: PolicyDecision, risk_level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            risk_level,
            metadata: BTreeMap::new(),
        }
    }

    /// Returns an allow decision.
    #[must_use]
    pub fn allow(risk_level: RiskLevel, reason: impl Into<String>) -> Self {
        Self::new(PolicyDecision::Allow, risk_level, reason)
    }

    /// Returns a deny decision.
    #[must_use]
    pub fn deny(risk_level: RiskLevel, reason: impl Into<String>) -> Self {
        Self::new(PolicyDecision::Deny, risk_level, reason)
    }

    /// Returns a decision requiring user confirmation.
    #[must_use]
    pub fn ask_user(risk_level: RiskLevel, reason: impl Into<String>) -> Self {
        Self::new(PolicyDecision::AskUser, risk_level, reason)
    }

    /// Adds a metadata entry and returns the updated result.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Overrides the risk level.
    #[must_use]
    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    /// Returns the decision.
    #[must_use]
    pub fn decision(&self) -> PolicyDecision {
        self.decision
    }

    /// Returns the explanation.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the risk classification.
    #[must_use]
    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    /// Returns attached metadata.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns the name of the rule that matched, if any.
    #[must_use]
    pub fn rule_name(&self) -> Option<&str> {
        self.metadata.get(RULE_METADATA_KEY).map(String::as_str)
    }

    /// Returns true when the call may proceed.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.decision == PolicyDecision::Allow
    }

    /// Returns true when the call is rejected.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.decision == PolicyDecision::Deny
    }

    /// Returns true when the user must confirm.
    #[must_use]
    pub fn is_ask_user(&self) -> bool {
        self.decision == PolicyDecision::AskUser
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_helpers_work() {
        let allow = PolicyDecisionResult::allow(RiskLevel::Low, "read only");
        assert!(allow.is_allow());
        assert!(!allow.is_deny());
        assert!(allow.rule_name().is_none());

        let deny = PolicyDecisionResult::deny(RiskLevel::Critical, "blocked")
            .with_metadata(RULE_METADATA_KEY, "no-traversal");
        assert!(deny.is_deny());
        assert_eq!(deny.reason(), "blocked");
        assert_eq!(deny.rule_name(), Some("no-traversal"));

        let ask = PolicyDecisionResult::ask_user(RiskLevel::High, "confirm");
        assert!(ask.is_ask_user());
        assert_eq!(ask.decision().to_string(), "ASK_USER");
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::Medium.max(RiskLevel::High), RiskLevel::High);
    }
}
