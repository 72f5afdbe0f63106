//! Compiler facade: walks a parsed document and substitutes every node with
//! the text it produces.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use devins_lang::{Node, Span, UsedKind, UsedNode, VariableNode, parse};
use devins_mcp::{McpClientManager, McpToolInfo, arguments_from_params};
use devins_policy::{ConfirmationHandler, PolicyDecision, PolicyEngine};
use devins_primitives::{ToolCall, ToolExecutionContext};
use devins_tools::{ToolHandle, ToolInput, ToolRegistry};
use devins_variables::{ResolveContext, ResolverChain};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::dispatch::{
    Invocation, Target, body_unterminated, builtin_invocation, denial_marker, origin,
    remote_invocation, trailing_source,
};
use crate::error::CompileError;
use crate::hooks::{AgentRunner, DecisionObserver};
use crate::options::CompilerOptions;
use crate::result::{CompileResult, CompileState};

/// Whether the walk goes on after a node.
enum Flow {
    Continue,
    Cancelled,
}

/// Outcome of the policy gate for one call.
enum Gate {
    Proceed,
    Denied,
    Cancelled,
}

/// Compiles DevIns source into prompt text, executing the tool calls it
/// contains. Every collaborator is injected; the compiler holds no global
/// state and can be shared across tasks.
pub struct Compiler {
    policy: Arc<dyn PolicyEngine>,
    registry: Arc<ToolRegistry>,
    resolvers: Arc<ResolverChain>,
    mcp: Option<Arc<McpClientManager>>,
    confirmation: Option<Arc<dyn ConfirmationHandler>>,
    agents: Option<Arc<dyn AgentRunner>>,
    observer: Option<Arc<dyn DecisionObserver>>,
    context: ToolExecutionContext,
    options: CompilerOptions,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("tools", &self.registry.list().len())
            .field("resolvers", &self.resolvers.resolver_names())
            .field("mcp_configured", &self.mcp.is_some())
            .field("confirmation_configured", &self.confirmation.is_some())
            .field("agent_runner_configured", &self.agents.is_some())
            .field("context", &self.context)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Compiler {
    /// Creates a compiler with no MCP manager, confirmation handler or agent
    /// runner, and an unbound execution context.
    #[must_use]
    pub fn new(
        policy: Arc<dyn PolicyEngine>,
        registry: Arc<ToolRegistry>,
        resolvers: Arc<ResolverChain>,
    ) -> Self {
        Self {
            policy,
            registry,
            resolvers,
            mcp: None,
            confirmation: None,
            agents: None,
            observer: None,
            context: ToolExecutionContext::default(),
            options: CompilerOptions::default(),
        }
    }

    /// Routes commands without a built-in tool to MCP servers.
    #[must_use]
    pub fn with_mcp(mut self, manager: Arc<McpClientManager>) -> Self {
        self.mcp = Some(manager);
        self
    }

    /// Answers `ASK_USER` decisions. Without one they are treated as denials.
    #[must_use]
    pub fn with_confirmation(mut self, handler: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmation = Some(handler);
        self
    }

    /// Executes `@agent` mentions.
    #[must_use]
    pub fn with_agent_runner(mut self, runner: Arc<dyn AgentRunner>) -> Self {
        self.agents = Some(runner);
        self
    }

    /// Receives every policy decision.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Sets the workspace, active file and session tools run against.
    #[must_use]
    pub fn with_context(mut self, context: ToolExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the execution context.
    #[must_use]
    pub fn context(&self) -> &ToolExecutionContext {
        &self.context
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> CompilerOptions {
        self.options
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Returns the variable resolvers.
    #[must_use]
    pub fn resolvers(&self) -> &Arc<ResolverChain> {
        &self.resolvers
    }

    /// Compiles `source` to completion.
    pub async fn compile(&self, source: &str) -> CompileResult {
        self.compile_with(source, &CancellationToken::new()).await
    }

    /// Compiles `source`, stopping early when `cancel` fires. A cancelled
    /// compile returns the text produced so far with
    /// [`CompileResult::cancelled`] set.
    pub async fn compile_with(&self, source: &str, cancel: &CancellationToken) -> CompileResult {
        let started = Instant::now();
        let session = self.context.session().session_id().short();
        info!(%session, bytes = source.len(), "compile started");

        if self.options.require_workspace() && self.context.workspace_root().is_none() {
            let error = CompileError::MissingWorkspace;
            warn!(%session, %error, "compile rejected");
            return CompileResult::failure(&error);
        }

        let parsed = parse(source);
        let resolve_ctx = ResolveContext::new(self.context.clone());
        let mut state = CompileState::new(parsed.diagnostics);

        for node in parsed.document.children() {
            if cancel.is_cancelled() {
                state.mark_cancelled();
                break;
            }
            let flow = self
                .compile_node(node, &resolve_ctx, cancel, &mut state)
                .await;
            if let Flow::Cancelled = flow {
                state.mark_cancelled();
                break;
            }
        }

        let result = state.finish();
        let stats = result.statistics();
        info!(
            %session,
            commands = stats.command_count,
            variables = stats.variable_count,
            agents = stats.agent_count,
            nodes = stats.node_count,
            has_error = result.has_error(),
            cancelled = result.cancelled(),
            elapsed_ms = started.elapsed().as_millis(),
            "compile finished"
        );
        result
    }

    async fn compile_node(
        &self,
        node: &Node,
        resolve_ctx: &ResolveContext,
        cancel: &CancellationToken,
        state: &mut CompileState,
    ) -> Flow {
        match node {
            Node::Text(text) => {
                state.visit(1);
                state.push(text);
                Flow::Continue
            }
            Node::CodeBlock(_) => {
                state.visit(1);
                state.push(&node.to_source());
                Flow::Continue
            }
            Node::Variable(variable) => {
                self.compile_variable(variable, resolve_ctx, cancel, state).await
            }
            Node::Used(used) => {
                state.visit(1 + used.children.len());
                match used.kind {
                    UsedKind::Command => self.compile_command(node, used, cancel, state).await,
                    UsedKind::Agent => self.compile_agent(node, used, cancel, state).await,
                }
            }
        }
    }

    async fn compile_variable(
        &self,
        variable: &VariableNode,
        resolve_ctx: &ResolveContext,
        cancel: &CancellationToken,
        state: &mut CompileState,
    ) -> Flow {
        state.visit(1);
        state.statistics.variable_count += 1;

        let resolving = self.resolvers.resolve(&variable.name, resolve_ctx);
        let Some(resolution) = race(cancel, resolving).await else {
            return Flow::Cancelled;
        };
        state.push(&resolution.value);
        if let Some(warning) = resolution.warning {
            state.warning(variable.span, warning.to_string());
        }
        Flow::Continue
    }

    async fn compile_command(
        &self,
        node: &Node,
        used: &UsedNode,
        cancel: &CancellationToken,
        state: &mut CompileState,
    ) -> Flow {
        state.statistics.command_count += 1;

        let target = self.target(&used.identifier);
        let takes_body = match &target {
            Target::Builtin(handle) => handle.metadata().accepts_body(),
            Target::Remote(_) => true,
            Target::Unknown => false,
        };
        if takes_body && body_unterminated(used) {
            warn!(command = %used.identifier, "command body is still open; not executed");
            state.warning(
                used.span,
                format!(
                    "`/{}` is followed by an unclosed code block and was not executed",
                    used.identifier
                ),
            );
            state.push(&node.to_source());
            return Flow::Continue;
        }

        match target {
            Target::Builtin(handle) => self.run_builtin(&handle, used, cancel, state).await,
            Target::Remote(info) => self.run_remote(&info, used, cancel, state).await,
            Target::Unknown if self.options.passthrough_unknown() => {
                warn!(command = %used.identifier, "unknown command passed through");
                state.warning(
                    used.span,
                    format!("unknown command `/{}` left as written", used.identifier),
                );
                state.push(&node.to_source());
                Flow::Continue
            }
            Target::Unknown => {
                warn!(command = %used.identifier, "unknown command");
                state.error(used.span, format!("unknown command `/{}`", used.identifier));
                Flow::Continue
            }
        }
    }

    fn target(&self, name: &str) -> Target {
        if let Some(handle) = self.registry.get(name) {
            return Target::Builtin(handle);
        }
        self.mcp
            .as_ref()
            .and_then(|manager| manager.find_tool(name))
            .filter(|info| info.enabled)
            .map_or(Target::Unknown, Target::Remote)
    }

    async fn run_builtin(
        &self,
        handle: &ToolHandle,
        used: &UsedNode,
        cancel: &CancellationToken,
        state: &mut CompileState,
    ) -> Flow {
        let metadata = handle.metadata();
        let invocation = builtin_invocation(metadata, used);
        let Some(call) = self.build_call(metadata.name(), used, &invocation, state) else {
            return Flow::Continue;
        };

        match self.gate(&call, false, cancel, state).await {
            Gate::Proceed => {}
            Gate::Denied => {
                state.push(&trailing_source(used, &invocation));
                return Flow::Continue;
            }
            Gate::Cancelled => return Flow::Cancelled,
        }

        let input = ToolInput::new(
            call.tool_name(),
            call.params().clone(),
            self.context.clone(),
        );
        let Some(outcome) = race(cancel, handle.invoke(input)).await else {
            return Flow::Cancelled;
        };
        match outcome {
            Ok(output) => {
                debug!(tool = call.tool_name(), bytes = output.as_str().len(), "tool completed");
                state.mark_local();
                state.push(output.as_str());
            }
            Err(err) => {
                warn!(tool = call.tool_name(), error = %err, "tool failed");
                state.error(used.span, err.to_string());
            }
        }
        state.push(&trailing_source(used, &invocation));
        Flow::Continue
    }

    async fn run_remote(
        &self,
        info: &McpToolInfo,
        used: &UsedNode,
        cancel: &CancellationToken,
        state: &mut CompileState,
    ) -> Flow {
        let Some(manager) = self.mcp.as_ref() else {
            return Flow::Continue;
        };
        let invocation = remote_invocation(info, used);
        let Some(call) = self.build_call(&info.qualified_name(), used, &invocation, state) else {
            return Flow::Continue;
        };

        let auto_approved = manager.auto_approved(&info.server_name, &info.name);
        match self.gate(&call, auto_approved, cancel, state).await {
            Gate::Proceed => {}
            Gate::Denied => return Flow::Continue,
            Gate::Cancelled => return Flow::Cancelled,
        }

        let arguments = arguments_from_params(call.params());
        let execution = manager.execute_tool(&info.server_name, &info.name, arguments);
        let Some(outcome) = race(cancel, execution).await else {
            return Flow::Cancelled;
        };
        match outcome {
            Ok(text) => {
                debug!(tool = call.tool_name(), bytes = text.len(), "mcp tool completed");
                state.push(&text);
            }
            Err(err) => {
                warn!(tool = call.tool_name(), error = %err, "mcp tool failed");
                state.error(used.span, err.to_string());
            }
        }
        Flow::Continue
    }

    async fn compile_agent(
        &self,
        node: &Node,
        used: &UsedNode,
        cancel: &CancellationToken,
        state: &mut CompileState,
    ) -> Flow {
        state.statistics.agent_count += 1;

        let call = match ToolCall::new(used.identifier.as_str()) {
            Ok(call) => call.with_origin(origin(used)),
            Err(err) => {
                state.warning(used.span, err.to_string());
                state.push(&node.to_source());
                return Flow::Continue;
            }
        };

        match self.gate(&call, false, cancel, state).await {
            Gate::Proceed => {}
            Gate::Denied => return Flow::Continue,
            Gate::Cancelled => return Flow::Cancelled,
        }

        let Some(runner) = self.agents.as_ref() else {
            debug!(agent = %used.identifier, "no agent runner; deferring to host");
            state.request_agent(&used.identifier);
            state.push(&node.to_source());
            return Flow::Continue;
        };

        let Some(outcome) = race(cancel, runner.run(&call, &self.context)).await else {
            return Flow::Cancelled;
        };
        match outcome {
            Ok(text) => state.push(&text),
            Err(err) => {
                warn!(agent = %used.identifier, error = %err, "agent failed");
                state.error(used.span, err.to_string());
            }
        }
        Flow::Continue
    }

    fn build_call(
        &self,
        name: &str,
        used: &UsedNode,
        invocation: &Invocation,
        state: &mut CompileState,
    ) -> Option<ToolCall> {
        match ToolCall::new(name) {
            Ok(call) => Some(
                call.with_params(invocation.params.clone())
                    .with_origin(origin(used)),
            ),
            Err(err) => {
                state.error(used.span, err.to_string());
                None
            }
        }
    }

    /// Resolves the call to one decision and applies it. Denials write the
    /// denial marker; `ASK_USER` consults the confirmation handler unless the
    /// tool is auto-approved.
    async fn gate(
        &self,
        call: &ToolCall,
        auto_approved: bool,
        cancel: &CancellationToken,
        state: &mut CompileState,
    ) -> Gate {
        let checking = self.policy.check_permission(call, &self.context);
        let Some(decision) = race(cancel, checking).await else {
            return Gate::Cancelled;
        };
        if let Some(observer) = &self.observer {
            observer.on_decision(call, &decision);
        }

        let origin = call.origin();
        let span = Span {
            line: origin.line(),
            column: origin.column(),
            ..Span::default()
        };

        let reason = match decision.decision() {
            PolicyDecision::Allow => {
                debug!(tool = call.tool_name(), risk = %decision.risk_level(), "call allowed");
                return Gate::Proceed;
            }
            PolicyDecision::Deny => decision.reason().to_owned(),
            PolicyDecision::AskUser if auto_approved => {
                debug!(tool = call.tool_name(), "call auto-approved");
                return Gate::Proceed;
            }
            PolicyDecision::AskUser => match &self.confirmation {
                Some(handler) => {
                    let Some(approved) = race(cancel, handler.confirm(call, &decision)).await
                    else {
                        return Gate::Cancelled;
                    };
                    if approved {
                        debug!(tool = call.tool_name(), "call confirmed");
                        return Gate::Proceed;
                    }
                    format!("{} (rejected by the user)", decision.reason())
                }
                None => {
                    state.warning(
                        span,
                        format!(
                            "`{}` needs confirmation but no handler is configured",
                            call.tool_name()
                        ),
                    );
                    decision.reason().to_owned()
                }
            },
        };

        warn!(
            tool = call.tool_name(),
            risk = %decision.risk_level(),
            rule = decision.rule_name(),
            %reason,
            "call denied"
        );
        state.warning(span, format!("`{}` denied: {reason}", call.tool_name()));
        state.push(&denial_marker(call.tool_name(), &reason));
        Gate::Denied
    }
}

/// Runs `future` unless `cancel` fires first.
async fn race<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        output = future => Some(output),
    }
}
