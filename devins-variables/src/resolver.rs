//! Resolver trait and the ordered resolution chain.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::ToolExecutionContext;
use devins_primitives::workspace::{FileSystem, VcsProvider};
use tracing::{debug, warn};

use crate::context::{ContextResolver, EditorContext};
use crate::error::ResolveResult;
use crate::pipeline::PipelineResolver;
use crate::snapshot::SnapshotLog;
use crate::system::SystemInfoResolver;
use crate::toolchain::ToolchainResolver;

/// State visible to resolvers during a compile.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    execution: ToolExecutionContext,
}

impl ResolveContext {
    /// Wraps the execution context of the current compile.
    #[must_use]
    pub fn new(execution: ToolExecutionContext) -> Self {
        Self { execution }
    }

    /// Returns the execution context.
    #[must_use]
    pub fn execution(&self) -> &ToolExecutionContext {
        &self.execution
    }

    /// Returns the bound workspace root, if any.
    #[must_use]
    pub fn workspace_root(&self) -> Option<&Path> {
        self.execution.workspace_root()
    }
}

/// A source of variable values.
#[async_trait]
pub trait VariableResolver: Send + Sync {
    /// Resolver name, recorded alongside produced values.
    fn name(&self) -> &str;

    /// Returns `true` when this resolver owns the variable name.
    fn claims(&self, variable: &str) -> bool;

    /// Produces the value for a claimed variable.
    async fn resolve(&self, variable: &str, ctx: &ResolveContext) -> ResolveResult<String>;
}

/// Warning recorded when a variable resolves to the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionWarning {
    /// Variable name.
    pub variable: String,
    /// Resolver that failed, `None` when nothing claimed the name.
    pub resolver: Option<String>,
    /// Human-readable reason.
    pub message: String,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resolver {
            Some(resolver) => write!(
                f,
                "variable `${}` failed in resolver `{resolver}`: {}",
                self.variable, self.message
            ),
            None => write!(f, "variable `${}` {}", self.variable, self.message),
        }
    }
}

/// Outcome of resolving one variable. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved value, empty on failure.
    pub value: String,
    /// Resolver that claimed the name.
    pub resolver: Option<String>,
    /// Index of the snapshot entry recording this value.
    pub snapshot: Option<usize>,
    /// Set when the value fell back to the empty string.
    pub warning: Option<ResolutionWarning>,
}

/// Ordered list of resolvers. The first resolver claiming a name wins.
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn VariableResolver>>,
    snapshots: SnapshotLog,
}

impl Default for ResolverChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverChain {
    /// Creates an empty chain; every lookup falls back to the empty string.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
            snapshots: SnapshotLog::new(),
        }
    }

    /// Creates the built-in chain: editor context, toolchain, system info,
    /// then user-defined pipelines.
    #[must_use]
    pub fn standard(
        editor: EditorContext,
        fs: Arc<dyn FileSystem>,
        vcs: Arc<dyn VcsProvider>,
        pipelines: PipelineResolver,
    ) -> Self {
        Self::new()
            .with_resolver(ContextResolver::new(editor))
            .with_resolver(ToolchainResolver::new(fs, vcs))
            .with_resolver(SystemInfoResolver::new())
            .with_resolver(pipelines)
    }

    /// Appends a resolver at the lowest precedence.
    #[must_use]
    pub fn with_resolver<R>(mut self, resolver: R) -> Self
    where
        R: VariableResolver + 'static,
    {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Returns resolver names in query order.
    #[must_use]
    pub fn resolver_names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Returns the log of values produced through this chain.
    #[must_use]
    pub fn snapshots(&self) -> &SnapshotLog {
        &self.snapshots
    }

    /// Resolves a variable. Unclaimed names and resolver failures produce an
    /// empty value plus a warning.
    pub async fn resolve(&self, variable: &str, ctx: &ResolveContext) -> Resolution {
        let Some(resolver) = self.resolvers.iter().find(|r| r.claims(variable)) else {
            warn!(variable, "no resolver claims variable");
            return Resolution {
                value: String::new(),
                resolver: None,
                snapshot: None,
                warning: Some(ResolutionWarning {
                    variable: variable.to_string(),
                    resolver: None,
                    message: "is not defined".into(),
                }),
            };
        };

        let name = resolver.name().to_string();
        match resolver.resolve(variable, ctx).await {
            Ok(value) => {
                debug!(variable, resolver = %name, "resolved variable");
                let index = self.snapshots.append(variable, value.as_str(), name.as_str()).await;
                Resolution {
                    value,
                    resolver: Some(name),
                    snapshot: Some(index),
                    warning: None,
                }
            }
            Err(err) => {
                warn!(variable, resolver = %name, error = %err, "variable resolution failed");
                Resolution {
                    value: String::new(),
                    resolver: Some(name.clone()),
                    snapshot: None,
                    warning: Some(ResolutionWarning {
                        variable: variable.to_string(),
                        resolver: Some(name),
                        message: err.to_string(),
                    }),
                }
            }
        }
    }
}
