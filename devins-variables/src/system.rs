//! Host and clock variables.

use async_trait::async_trait;
use chrono::{Local, Utc};

use crate::error::{ResolveError, ResolveResult};
use crate::resolver::{ResolveContext, VariableResolver};

const VARIABLES: &[&str] = &["os", "arch", "date", "time", "timestamp", "user", "cwd"];

/// Resolves operating-system, user, and clock variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInfoResolver;

impl SystemInfoResolver {
    /// Creates the resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VariableResolver for SystemInfoResolver {
    fn name(&self) -> &str {
        "system"
    }

    fn claims(&self, variable: &str) -> bool {
        VARIABLES.contains(&variable)
    }

    async fn resolve(&self, variable: &str, ctx: &ResolveContext) -> ResolveResult<String> {
        let value = match variable {
            "os" => std::env::consts::OS.to_string(),
            "arch" => std::env::consts::ARCH.to_string(),
            "date" => Local::now().format("%Y-%m-%d").to_string(),
            "time" => Local::now().format("%H:%M:%S").to_string(),
            "timestamp" => Utc::now().to_rfc3339(),
            "user" => std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .map_err(|_| ResolveError::Unavailable {
                    name: variable.to_string(),
                    reason: "neither USER nor USERNAME is set",
                })?,
            "cwd" => match ctx.workspace_root() {
                Some(root) => root.display().to_string(),
                None => std::env::current_dir()
                    .map_err(devins_primitives::WorkspaceError::from)?
                    .display()
                    .to_string(),
            },
            _ => String::new(),
        };
        Ok(value)
    }
}
