//! Runtime registry for tool metadata and execution.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use devins_primitives::{ToolExecutionContext, WorkspaceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Metadata describing a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMetadata {
    name: String,
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    aliases: Vec<String>,
    #[serde(default)]
    supports_completion: bool,
    #[serde(default)]
    requires_properties: bool,
    #[serde(default)]
    is_read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primary_param: Option<String>,
    #[serde(default)]
    accepts_body: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    examples: Vec<String>,
}

impl ToolMetadata {
    /// Creates metadata for the supplied name and description.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] if the name is empty or contains
    /// whitespace.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> ToolResult<Self> {
        let name = name.into();
        validate_name(&name)?;

        Ok(Self {
            name,
            description: description.into(),
            aliases: Vec::new(),
            supports_completion: false,
            requires_properties: false,
            is_read_only: false,
            primary_param: None,
            accepts_body: false,
            examples: Vec::new(),
        })
    }

    /// Adds alternative names resolving to this tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] for an empty or whitespace alias.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> ToolResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alias in aliases {
            let alias = alias.into();
            validate_name(&alias)?;
            self.aliases.push(alias);
        }
        Ok(self)
    }

    /// Marks the tool as offering argument completion in editors.
    #[must_use]
    pub fn with_completion(mut self) -> Self {
        self.supports_completion = true;
        self
    }

    /// Names the parameter bound to the `:value` part of a command and marks
    /// that value as required.
    #[must_use]
    pub fn with_primary_param(mut self, name: impl Into<String>) -> Self {
        self.primary_param = Some(name.into());
        self.requires_properties = true;
        self
    }

    /// Names the `:value` parameter without requiring it.
    #[must_use]
    pub fn with_optional_param(mut self, name: impl Into<String>) -> Self {
        self.primary_param = Some(name.into());
        self.requires_properties = false;
        self
    }

    /// Marks the tool as having no side effects.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.is_read_only = true;
        self
    }

    /// Lets the tool consume the code block following the command as `content`.
    #[must_use]
    pub fn accepting_body(mut self) -> Self {
        self.accepts_body = true;
        self
    }

    /// Adds a usage example shown in help output.
    #[must_use]
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns alternative names.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Returns whether the tool supports argument completion.
    #[must_use]
    pub fn supports_completion(&self) -> bool {
        self.supports_completion
    }

    /// Returns whether the `:value` part is required.
    #[must_use]
    pub fn requires_properties(&self) -> bool {
        self.requires_properties
    }

    /// Returns whether the tool is side-effect free.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    /// Returns the parameter bound to the `:value` part.
    #[must_use]
    pub fn primary_param(&self) -> Option<&str> {
        self.primary_param.as_deref()
    }

    /// Returns whether the following code block is consumed as `content`.
    #[must_use]
    pub fn accepts_body(&self) -> bool {
        self.accepts_body
    }

    /// Returns usage examples.
    #[must_use]
    pub fn examples(&self) -> &[String] {
        &self.examples
    }
}

fn validate_name(name: &str) -> ToolResult<()> {
    if name.trim().is_empty() {
        return Err(ToolError::InvalidMetadata {
            reason: "tool name cannot be empty".into(),
        });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ToolError::InvalidMetadata {
            reason: format!("tool name `{name}` cannot contain whitespace"),
        });
    }
    Ok(())
}

/// Parameter name carrying a command's attached code block.
pub const CONTENT_PARAM: &str = "content";

/// Input handed to a tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolInput {
    tool: String,
    params: BTreeMap<String, String>,
    context: ToolExecutionContext,
}

impl ToolInput {
    /// Creates an input for `tool`.
    #[must_use]
    pub fn new(
        tool: impl Into<String>,
        params: BTreeMap<String, String>,
        context: ToolExecutionContext,
    ) -> Self {
        Self {
            tool: tool.into(),
            params,
            context,
        }
    }

    /// Returns the name the tool was invoked under.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Returns all parameters.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns a non-blank parameter value or a [`ToolError::MissingParameter`].
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MissingParameter`] when absent or blank.
    pub fn require(&self, name: &str) -> ToolResult<&str> {
        self.param(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ToolError::MissingParameter {
                tool: self.tool.clone(),
                name: name.to_string(),
            })
    }

    /// Returns the execution context.
    #[must_use]
    pub fn context(&self) -> &ToolExecutionContext {
        &self.context
    }
}

/// Text produced by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    text: String,
}

impl ToolOutput {
    /// Wraps the output text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns the output text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consumes the output, returning the text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Trait implemented by tool executors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool.
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(ToolInput) -> Fut,
    Fut: Future<Output = ToolResult<ToolOutput>> + Send,
{
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        (self)(input).await
    }
}

/// Handle returned by the registry for direct invocation.
#[derive(Clone)]
pub struct ToolHandle {
    metadata: ToolMetadata,
    executor: Arc<dyn Tool>,
}

impl ToolHandle {
    /// Returns the associated metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Executes the underlying tool implementation.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the underlying implementation.
    pub async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        self.executor.invoke(input).await
    }
}

#[derive(Default)]
struct RegistryInner {
    tools: Vec<ToolHandle>,
    index: HashMap<String, usize>,
}

/// Registry storing tools in registration order, indexed by name and alias.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("tool registry poisoned");
        let names: Vec<_> = inner.tools.iter().map(|t| t.metadata.name()).collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name or an alias is already
    /// present.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_tool<T>(&self, metadata: ToolMetadata, tool: T) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        let keys: Vec<String> = std::iter::once(metadata.name())
            .chain(metadata.aliases().iter().map(String::as_str))
            .map(str::to_owned)
            .collect();

        if let Some(name) = keys.iter().find(|key| inner.index.contains_key(*key)) {
            return Err(ToolError::DuplicateTool { name: name.clone() });
        }

        let position = inner.tools.len();
        for key in keys {
            inner.index.insert(key, position);
        }
        inner.tools.push(ToolHandle {
            metadata,
            executor: Arc::new(tool),
        });

        Ok(())
    }

    /// Returns a handle to the tool matching the supplied name or alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolHandle> {
        let inner = self.inner.read().ok()?;
        let position = *inner.index.get(name)?;
        inner.tools.get(position).cloned()
    }

    /// Returns `true` when a tool answers to `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .is_ok_and(|inner| inner.index.contains_key(name))
    }

    /// Returns `true` when `name` resolves to a read-only tool.
    #[must_use]
    pub fn is_read_only(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|handle| handle.metadata().is_read_only())
    }

    /// Returns every name and alias of read-only tools.
    #[must_use]
    pub fn read_only_names(&self) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(ToolMetadata::is_read_only)
            .flat_map(|meta| {
                std::iter::once(meta.name().to_owned()).chain(meta.aliases().to_vec())
            })
            .collect()
    }

    /// Invokes a registered tool directly.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the tool is not found or
    /// propagates the implementation's error.
    pub async fn invoke(&self, name: &str, input: ToolInput) -> ToolResult<ToolOutput> {
        let handle = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })?;
        handle.invoke(input).await
    }

    /// Lists the metadata of all registered tools in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<ToolMetadata> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner
            .tools
            .iter()
            .map(|handle| handle.metadata.clone())
            .collect()
    }

    /// Renders markdown help for every registered tool.
    #[must_use]
    pub fn help_text(&self) -> String {
        let mut out = String::from("## Available commands\n");
        for meta in self.list() {
            let usage = match meta.primary_param() {
                Some(param) if meta.requires_properties() => format!("/{}:<{param}>", meta.name()),
                Some(param) => format!("/{}[:<{param}>]", meta.name()),
                None => format!("/{}", meta.name()),
            };
            let _ = write!(out, "\n- `{usage}`: {}", meta.description());
            if !meta.aliases().is_empty() {
                let _ = write!(out, " (alias: {})", meta.aliases().join(", "));
            }
            if meta.is_read_only() {
                out.push_str(" [read-only]");
            }
            if meta.accepts_body() {
                out.push_str(" Takes the following code block as input.");
            }
            for example in meta.examples() {
                let _ = write!(out, "\n  - e.g. `{example}`");
            }
        }
        out.push('\n');
        out
    }
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// A required parameter was not supplied.
    #[error("`{tool}` requires the `{name}` parameter")]
    MissingParameter {
        /// Tool name.
        tool: String,
        /// Parameter name.
        name: String,
    },

    /// A workspace collaborator failed.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ToolMetadata {
        ToolMetadata::new("echo", "Echo the message parameter")
            .unwrap()
            .with_aliases(["say"])
            .unwrap()
            .with_primary_param("message")
            .read_only()
            .with_example("/echo:hello")
    }

    async fn echo(input: ToolInput) -> ToolResult<ToolOutput> {
        Ok(ToolOutput::text(input.require("message")?))
    }

    fn input(message: &str) -> ToolInput {
        let params = BTreeMap::from([("message".to_string(), message.to_string())]);
        ToolInput::new("echo", params, ToolExecutionContext::default())
    }

    #[tokio::test]
    async fn register_and_invoke_tool() {
        let registry = ToolRegistry::new();
        registry.register_tool(metadata(), echo).unwrap();

        let output = registry.invoke("echo", input("hello")).await.unwrap();
        assert_eq!(output.as_str(), "hello");

        let output = registry.invoke("say", input("alias")).await.unwrap();
        assert_eq!(output.into_text(), "alias");
    }

    #[tokio::test]
    async fn duplicate_registration_errors() {
        let registry = ToolRegistry::new();
        registry.register_tool(metadata(), echo).unwrap();

        let err = registry
            .register_tool(ToolMetadata::new("say", "other").unwrap(), echo)
            .expect_err("alias collision should fail");

        assert!(matches!(err, ToolError::DuplicateTool { name } if name == "say"));
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let registry = ToolRegistry::new();
        let err = registry
            .invoke("missing", ToolInput::default())
            .await
            .expect_err("unknown tool should error");

        assert!(matches!(err, ToolError::UnknownTool { name } if name == "missing"));
    }

    #[tokio::test]
    async fn missing_parameter_errors() {
        let registry = ToolRegistry::new();
        registry.register_tool(metadata(), echo).unwrap();

        let err = registry
            .invoke("echo", ToolInput::new("echo", BTreeMap::new(), ToolExecutionContext::default()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "`echo` requires the `message` parameter");
    }

    #[test]
    fn invalid_metadata_errors() {
        let err = ToolMetadata::new("", "x").expect_err("empty name should error");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));

        let err = ToolMetadata::new("read file", "x").expect_err("whitespace should error");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));
    }

    #[test]
    fn list_keeps_registration_order_and_help_mentions_tools() {
        let registry = ToolRegistry::new();
        registry
            .register_tool(ToolMetadata::new("zeta", "last letter").unwrap(), echo)
            .unwrap();
        registry.register_tool(metadata(), echo).unwrap();

        let names: Vec<_> = registry.list().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, ["zeta", "echo"]);
        assert!(registry.contains("say"));
        assert!(registry.is_read_only("say"));
        assert!(!registry.is_read_only("zeta"));
        assert_eq!(registry.read_only_names(), ["echo", "say"]);

        let help = registry.help_text();
        assert!(help.contains("- `/zeta`: last letter"));
        assert!(help.contains("- `/echo:<message>`: Echo the message parameter (alias: say) [read-only]"));
        assert!(help.contains("e.g. `/echo:hello`"));
    }
}
