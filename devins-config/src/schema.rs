//! Strongly typed compiler settings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use devins_mcp::{
    DEFAULT_MAX_CONCURRENT_CONNECTIONS, DEFAULT_REQUEST_TIMEOUT, McpClientManager, McpConfig,
};
use devins_policy::{
    PolicyDecision, PolicyDecisionResult, PolicyRule, PolicyRuleSpec, RiskLevel, RulePolicyEngine,
};
use devins_primitives::workspace::FileSystem;
use devins_variables::PipelineResolver;
use serde::{Deserialize, Serialize};

const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 60;

/// Settings read from `devins.json`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerSettings {
    require_workspace: bool,
    process_timeout_secs: u64,
    mcp_request_timeout_secs: u64,
    max_concurrent_connections: usize,
    default_decision: PolicyDecision,
    default_risk: RiskLevel,
    use_default_rules: bool,
    policy_rules: Vec<PolicyRuleSpec>,
    variables: BTreeMap<String, String>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            require_workspace: false,
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
            mcp_request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_concurrent_connections: DEFAULT_MAX_CONCURRENT_CONNECTIONS,
            default_decision: PolicyDecision::Allow,
            default_risk: RiskLevel::Low,
            use_default_rules: true,
            policy_rules: Vec::new(),
            variables: BTreeMap::new(),
        }
    }
}

impl CompilerSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses settings from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid settings JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid compiler settings")
    }

    /// Requires a bound workspace root before compiling.
    #[must_use]
    pub fn with_require_workspace(mut self, require: bool) -> Self {
        self.require_workspace = require;
        self
    }

    /// Sets the limit applied to every spawned process.
    #[must_use]
    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets the limit applied to every MCP request.
    #[must_use]
    pub fn with_mcp_request_timeout(mut self, timeout: Duration) -> Self {
        self.mcp_request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets how many MCP servers are connected at once during discovery.
    #[must_use]
    pub fn with_max_concurrent_connections(mut self, max: usize) -> Self {
        self.max_concurrent_connections = max.max(1);
        self
    }

    /// Sets the decision for calls no rule matches.
    #[must_use]
    pub fn with_default_decision(mut self, decision: PolicyDecision, risk: RiskLevel) -> Self {
        self.default_decision = decision;
        self.default_risk = risk;
        self
    }

    /// Enables or disables the built-in rule set.
    #[must_use]
    pub fn with_default_rules(mut self, enabled: bool) -> Self {
        self.use_default_rules = enabled;
        self
    }

    /// Adds a configured policy rule.
    #[must_use]
    pub fn with_policy_rule(mut self, rule: PolicyRuleSpec) -> Self {
        self.policy_rules.push(rule);
        self
    }

    /// Binds a variable name to a pipeline expression.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, expr: impl Into<String>) -> Self {
        self.variables.insert(name.into(), expr.into());
        self
    }

    /// Returns whether compiles without a workspace fail.
    #[must_use]
    pub fn require_workspace(&self) -> bool {
        self.require_workspace
    }

    /// Returns the process time limit.
    #[must_use]
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    /// Returns the MCP request time limit.
    #[must_use]
    pub fn mcp_request_timeout(&self) -> Duration {
        Duration::from_secs(self.mcp_request_timeout_secs)
    }

    /// Returns the discovery concurrency bound.
    #[must_use]
    pub fn max_concurrent_connections(&self) -> usize {
        self.max_concurrent_connections
    }

    /// Returns the configured policy rules.
    #[must_use]
    pub fn policy_rules(&self) -> &[PolicyRuleSpec] {
        &self.policy_rules
    }

    /// Returns the pipeline variable definitions.
    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Returns the decision applied when no rule matches.
    #[must_use]
    pub fn default_decision(&self) -> PolicyDecisionResult {
        PolicyDecisionResult::new(
            self.default_decision,
            self.default_risk,
            "no policy rule matched; configured default applies",
        )
    }

    /// Builds a rule engine from the built-in rules (when enabled) followed by
    /// the configured ones.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first configured rule that fails to compile.
    pub fn policy_engine(&self) -> Result<RulePolicyEngine> {
        let engine = if self.use_default_rules {
            RulePolicyEngine::with_default_rules()
        } else {
            RulePolicyEngine::new()
        }
        .with_default(self.default_decision());

        for spec in &self.policy_rules {
            let rule = PolicyRule::try_from(spec)
                .with_context(|| format!("invalid policy rule `{}`", spec.name))?;
            engine.add_rule(rule);
        }
        Ok(engine)
    }

    /// Builds the pipeline resolver for the configured variables.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first malformed definition.
    pub fn pipeline_resolver(&self, fs: Arc<dyn FileSystem>) -> Result<PipelineResolver> {
        let mut resolver = PipelineResolver::new(fs);
        for (name, expr) in &self.variables {
            resolver = resolver
                .with_definition(name, expr)
                .with_context(|| format!("invalid pipeline for variable `{name}`"))?;
        }
        Ok(resolver)
    }

    /// Creates an MCP manager for `config` using these limits.
    #[must_use]
    pub fn mcp_manager(&self, config: McpConfig) -> McpClientManager {
        McpClientManager::new(config)
            .with_max_concurrent(self.max_concurrent_connections)
            .with_request_timeout(self.mcp_request_timeout())
    }
}
