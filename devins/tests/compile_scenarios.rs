use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devins::compiler::{CancellationToken, CompileResult, Compiler};
use devins::policy::{
    PolicyDecision, PolicyDecisionResult, PolicyEngine, PolicyRule, RiskLevel, RulePolicyEngine,
};
use devins::primitives::ToolExecutionContext;
use devins::tools::{
    ToolCollaborators, ToolInput, ToolMetadata, ToolOutput, ToolRegistry, standard_registry,
};
use devins::variables::{ResolveContext, ResolveResult, ResolverChain, VariableResolver};

struct TempWorkspace {
    root: PathBuf,
}

impl TempWorkspace {
    fn new() -> Self {
        let root = std::env::temp_dir().join(format!("devins-it-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn with_file(self, name: &str, contents: &str) -> Self {
        std::fs::write(self.root.join(name), contents).unwrap();
        self
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

struct Project;

#[async_trait]
impl VariableResolver for Project {
    fn name(&self) -> &str {
        "project"
    }

    fn claims(&self, variable: &str) -> bool {
        variable == "project"
    }

    async fn resolve(&self, _variable: &str, _ctx: &ResolveContext) -> ResolveResult<String> {
        Ok("devins".into())
    }
}

fn compiler(engine: Arc<dyn PolicyEngine>, resolvers: ResolverChain) -> Compiler {
    let registry = standard_registry(&ToolCollaborators::local()).unwrap();
    Compiler::new(engine, Arc::new(registry), Arc::new(resolvers))
}

fn default_compiler() -> Compiler {
    compiler(
        Arc::new(RulePolicyEngine::with_default_rules()),
        ResolverChain::new().with_resolver(Project),
    )
}

async fn compile_in(workspace: &TempWorkspace, source: &str) -> CompileResult {
    default_compiler()
        .with_context(ToolExecutionContext::default().with_workspace_root(workspace.root.clone()))
        .compile(source)
        .await
}

#[tokio::test]
async fn read_file_renders_fenced_block() {
    let workspace = TempWorkspace::new().with_file("README.md", "# Demo\nhello\n");

    let result = compile_in(&workspace, "/read-file:README.md").await;

    assert_eq!(
        result.output_text(),
        "## file: README.md\n```markdown\n# Demo\nhello\n```"
    );
    assert_eq!(result.statistics().command_count, 1);
    assert!(result.is_local_command());
    assert!(!result.has_error());
}

#[tokio::test]
async fn read_file_without_workspace_reports_error() {
    let result = default_compiler().compile("/read-file:README.md").await;

    assert!(result.has_error());
    assert!(result.output_text().starts_with("<DevInsError>: "));
    assert!(result.output_text().contains("could not read file `README.md`"));
    assert!(
        result
            .error_message()
            .is_some_and(|message| message.contains("README.md"))
    );
    assert_eq!(result.statistics().command_count, 1);
}

#[tokio::test]
async fn read_file_honours_line_ranges() {
    let workspace = TempWorkspace::new().with_file("notes.txt", "one\ntwo\nthree\nfour\n");

    let result = compile_in(&workspace, "see /read-file:notes.txt#L2-L3 above").await;

    assert!(result.output_text().starts_with("see ## file: notes.txt\n```"));
    assert!(result.output_text().contains("two\nthree\n```"));
    assert!(!result.output_text().contains("four"));
    assert!(result.output_text().ends_with(" above"));
}

#[tokio::test]
async fn write_file_consumes_code_block() {
    let workspace = TempWorkspace::new();
    let source = "/write-file:hello.txt\n```\nhi there\n```\nwritten";

    let result = compile_in(&workspace, source).await;

    assert!(!result.has_error(), "{:?}", result.error_message());
    assert!(result.output_text().starts_with("Wrote "));
    assert!(!result.output_text().contains("hi there"));
    assert!(result.output_text().ends_with("\nwritten"));
    let written = std::fs::read_to_string(workspace.root.join("hello.txt")).unwrap();
    assert_eq!(written, "hi there\n");
}

#[tokio::test]
async fn patch_applies_diff_body() {
    let workspace = TempWorkspace::new().with_file("lib.rs", "fn a() {\n    1\n}\n");
    let source = "/patch:lib.rs\n```diff\n@@ -1,3 +1,3 @@\n fn a() {\n-    1\n+    2\n }\n```\nok";

    let result = compile_in(&workspace, source).await;

    assert!(!result.has_error(), "{:?}", result.error_message());
    assert_eq!(result.output_text(), "Patched lib.rs (+1 -1)\nok");
    let patched = std::fs::read_to_string(workspace.root.join("lib.rs")).unwrap();
    assert_eq!(patched, "fn a() {\n    2\n}\n");
}

#[tokio::test]
async fn streamed_write_waits_for_closing_fence() {
    let workspace = TempWorkspace::new();
    let source = "/write-file:draft.txt\n```\nhalf of the";

    let result = compile_in(&workspace, source).await;

    assert_eq!(result.output_text(), source);
    assert!(!workspace.root.join("draft.txt").exists());
}

#[tokio::test]
async fn inline_code_does_not_hide_commands() {
    let workspace = TempWorkspace::new().with_file("a.rs", "");

    let result = compile_in(&workspace, "Use ```ls``` or /list-dir:. for ${project}").await;

    assert!(result.output_text().starts_with("Use ```ls``` or ## dir: ."));
    assert!(result.output_text().ends_with(" for devins"));
    assert_eq!(result.statistics().command_count, 1);
    assert_eq!(result.statistics().variable_count, 1);
}

#[tokio::test]
async fn traversal_writes_are_denied_inline() {
    let workspace = TempWorkspace::new();
    let source = "/write-file:../../etc/passwd\n```\nroot\n```\n";

    let result = compile_in(&workspace, source).await;

    assert!(
        result
            .output_text()
            .starts_with(r#"<PolicyDenied tool="write-file">"#)
    );
    assert!(!result.has_error());
    assert!(!result.is_local_command());
    assert!(!result.diagnostics().is_empty());
}

#[tokio::test]
async fn unresolved_variable_becomes_empty_with_warning() {
    let compiler = compiler(
        Arc::new(RulePolicyEngine::with_default_rules()),
        ResolverChain::new(),
    );

    let result = compiler.compile("Hello $name!").await;

    assert_eq!(result.output_text(), "Hello !");
    assert_eq!(result.statistics().variable_count, 1);
    assert_eq!(result.diagnostics().len(), 1);
    assert!(!result.has_error());
}

#[tokio::test]
async fn variables_and_commands_mix() {
    let workspace = TempWorkspace::new().with_file("a.rs", "fn main() {}\n");

    let result = compile_in(&workspace, "Project ${project} has /list-dir:. done").await;

    assert!(result.output_text().starts_with("Project devins has "));
    assert!(result.output_text().contains("a.rs"));
    assert!(result.output_text().ends_with(" done"));
    assert_eq!(result.statistics().variable_count, 1);
    assert_eq!(result.statistics().command_count, 1);
}

#[tokio::test]
async fn prose_without_triggers_is_identity() {
    let sources = [
        "",
        "Just some prose.",
        "Paths like src/lib.rs and mail me@example.com cost $5.",
        "Line one\n\nLine three with trailing spaces   \n",
        "Fenced prose:\n```text\nno commands here\n```\n",
    ];
    let compiler = default_compiler();

    for source in sources {
        let result = compiler.compile(source).await;
        assert_eq!(result.output_text(), source);
        assert_eq!(result.statistics().command_count, 0);
        assert!(!result.has_error());
    }
}

#[tokio::test]
async fn deny_all_engine_blocks_every_tool() {
    let engine = RulePolicyEngine::new()
        .with_default(PolicyDecisionResult::deny(RiskLevel::High, "tools are disabled"));
    let result = compiler(Arc::new(engine), ResolverChain::new())
        .compile("/read-file:README.md and /shell:ls")
        .await;

    assert_eq!(
        result.output_text(),
        "<PolicyDenied tool=\"read-file\">tools are disabled</PolicyDenied> and \
         <PolicyDenied tool=\"shell\">tools are disabled</PolicyDenied>"
    );
    assert_eq!(result.statistics().command_count, 2);
}

#[tokio::test]
async fn aliases_are_checked_under_canonical_name() {
    let engine = RulePolicyEngine::new();
    engine.add_rule(
        PolicyRule::new("no-reads", "read-file", PolicyDecision::Deny, RiskLevel::Medium)
            .unwrap()
            .with_description("reads are blocked"),
    );
    let result = compiler(Arc::new(engine), ResolverChain::new())
        .compile("/file:README.md")
        .await;

    assert!(
        result
            .output_text()
            .starts_with(r#"<PolicyDenied tool="read-file">"#)
    );
}

#[tokio::test]
async fn cancellation_returns_partial_output() {
    let registry = ToolRegistry::new();
    registry
        .register_tool(
            ToolMetadata::new("wait", "Waits a long time").unwrap(),
            |_input: ToolInput| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ToolOutput::text("finished"))
            },
        )
        .unwrap();
    let compiler = Compiler::new(
        Arc::new(RulePolicyEngine::new()),
        Arc::new(registry),
        Arc::new(ResolverChain::new()),
    );
    let token = CancellationToken::new();

    let (result, ()) = tokio::join!(compiler.compile_with("start /wait end", &token), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    assert!(result.cancelled());
    assert_eq!(result.output_text(), "start ");
}
