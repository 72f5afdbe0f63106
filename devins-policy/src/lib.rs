//! Permission checks for DevIns tool calls.
//!
//! Every tool call is checked before it runs. [`RulePolicyEngine`] evaluates
//! declarative [`PolicyRule`]s in priority order; the first rule whose tool
//! pattern and parameter constraints match decides. A matching rule with a
//! violated `forbidden` parameter denies the call outright.

#![warn(missing_docs, clippy::pedantic)]

mod contracts;
mod decision;
mod defaults;
mod engine;
mod integrations;

pub use contracts::{ParameterRule, ParameterRuleSpec, PolicyRule, PolicyRuleSpec};
pub use decision::{PolicyDecision, PolicyDecisionResult, RULE_METADATA_KEY, RiskLevel};
pub use defaults::{READ_ONLY_TOOLS, default_rules};
pub use engine::{PolicyEngine, PolicyError, PolicyResult, ReadOnlyAwareEngine, RulePolicyEngine};
pub use integrations::{
    ConfirmationHandler, GovernanceClient, RemotePolicyEngine, StaticConfirmation,
};
