//! Integrations with users and external governance systems.

use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::{ToolCall, ToolExecutionContext};
use tracing::warn;

use crate::decision::{PolicyDecisionResult, RiskLevel};
use crate::engine::{PolicyEngine, PolicyResult};

/// Asks the user to confirm calls whose decision is `ASK_USER`.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    /// Returns `true` when the user approves the call.
    async fn confirm(&self, call: &ToolCall, decision: &PolicyDecisionResult) -> bool;
}

/// Confirmation handler giving the same answer to every request.
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmation {
    approve: bool,
}

impl StaticConfirmation {
    /// Approves every request.
    #[must_use]
    pub const fn approve_all() -> Self {
        Self { approve: true }
    }

    /// Rejects every request.
    #[must_use]
    pub const fn reject_all() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl ConfirmationHandler for StaticConfirmation {
    async fn confirm(&self, _call: &ToolCall, _decision: &PolicyDecisionResult) -> bool {
        self.approve
    }
}

/// Trait implemented by remote governance backends.
#[async_trait]
pub trait GovernanceClient: Send + Sync {
    /// Evaluates the call and returns a decision from the backend.
    async fn evaluate(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
    ) -> PolicyResult<PolicyDecisionResult>;
}

/// Policy engine adapter that delegates to a remote governance client.
///
/// Backend failures deny the call.
#[derive(Clone)]
pub struct RemotePolicyEngine<C>
where
    C: GovernanceClient + 'static,
{
    client: Arc<C>,
}

impl<C> RemotePolicyEngine<C>
where
    C: GovernanceClient + 'static,
{
    /// Creates a new remote policy engine using the provided client.
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> PolicyEngine for RemotePolicyEngine<C>
where
    C: GovernanceClient + 'static,
{
    async fn check_permission(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
    ) -> PolicyDecisionResult {
        match self.client.evaluate(call, ctx).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(tool = call.tool_name(), error = %err, "governance backend unavailable");
                PolicyDecisionResult::deny(RiskLevel::High, err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PolicyError;

    struct StaticClient;

    #[async_trait]
    impl GovernanceClient for StaticClient {
        async fn evaluate(
            &self,
            _call: &ToolCall,
            _ctx: &ToolExecutionContext,
        ) -> PolicyResult<PolicyDecisionResult> {
            Ok(PolicyDecisionResult::ask_user(RiskLevel::Medium, "review"))
        }
    }

    struct OfflineClient;

    #[async_trait]
    impl GovernanceClient for OfflineClient {
        async fn evaluate(
            &self,
            _call: &ToolCall,
            _ctx: &ToolExecutionContext,
        ) -> PolicyResult<PolicyDecisionResult> {
            Err(PolicyError::Backend {
                reason: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn remote_engine_delegates_to_client() {
        let engine = RemotePolicyEngine::new(Arc::new(StaticClient));
        let call = ToolCall::new("shell").unwrap();

        let decision = engine
            .check_permission(&call, &ToolExecutionContext::default())
            .await;
        assert!(decision.is_ask_user());
    }

    #[tokio::test]
    async fn backend_failure_denies() {
        let engine = RemotePolicyEngine::new(Arc::new(OfflineClient));
        let call = ToolCall::new("shell").unwrap();

        let decision = engine
            .check_permission(&call, &ToolExecutionContext::default())
            .await;
        assert!(decision.is_deny());
        assert!(decision.reason().contains("connection refused"));
    }

    #[tokio::test]
    async fn static_confirmation_answers() {
        let call = ToolCall::new("shell").unwrap();
        let decision = PolicyDecisionResult::ask_user(RiskLevel::High, "confirm");
        assert!(StaticConfirmation::approve_all().confirm(&call, &decision).await);
        assert!(!StaticConfirmation::reject_all().confirm(&call, &decision).await);
    }
}
