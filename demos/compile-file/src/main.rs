//! Compile File - Runs a `.devin` file through the DevIns compiler

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use devins::compiler::{Compiler, CompilerOptions, TracingDecisionObserver};
use devins::config::ConfigLoader;
use devins::primitives::ToolExecutionContext;
use devins::telemetry::{TelemetryConfig, init_tracing};
use devins::tools::{ToolCollaborators, standard_registry};
use devins::variables::{EditorContext, ResolverChain};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&TelemetryConfig::new().with_target(false))?;

    let mut args = std::env::args().skip(1);
    let Some(file) = args.next().map(PathBuf::from) else {
        bail!("usage: devins-compile-file <file.devin> [workspace-dir]");
    };
    let workspace = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("no current directory")?,
    };
    let source = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("could not read {}", file.display()))?;

    let loader = ConfigLoader::from_env()?;
    let (mcp_config, settings) = loader.load()?.into_parts();
    info!(config = %loader.dir().display(), "configuration loaded");

    let collaborators = ToolCollaborators::local().with_process_timeout(settings.process_timeout());
    let registry = standard_registry(&collaborators)?;
    let resolvers = ResolverChain::standard(
        EditorContext::new().with_active_file(&file),
        collaborators.fs(),
        collaborators.vcs(),
        settings.pipeline_resolver(collaborators.fs())?,
    );

    let has_servers = mcp_config.enabled_servers().next().is_some();
    let manager = Arc::new(settings.mcp_manager(mcp_config));
    if has_servers {
        let discovered = manager.discover_all_tools().await;
        info!(servers = discovered.len(), "mcp servers ready");
    }

    let compiler = Compiler::new(
        Arc::new(settings.policy_engine()?),
        Arc::new(registry),
        Arc::new(resolvers),
    )
    .with_mcp(Arc::clone(&manager))
    .with_observer(Arc::new(TracingDecisionObserver))
    .with_context(ToolExecutionContext::default().with_workspace_root(workspace))
    .with_options(CompilerOptions::new().with_require_workspace(settings.require_workspace()));

    let result = compiler.compile(&source).await;
    for diagnostic in result.diagnostics() {
        warn!(
            line = diagnostic.line,
            column = diagnostic.column,
            severity = ?diagnostic.severity,
            "{}",
            diagnostic.message
        );
    }

    println!("{}", result.output_text());
    if let Some(agent) = result.execute_agent() {
        info!(agent, "prompt should be sent to agent");
    }
    manager.shutdown().await;

    if let Some(message) = result.error_message() {
        bail!("compile reported an error: {message}");
    }
    Ok(())
}
