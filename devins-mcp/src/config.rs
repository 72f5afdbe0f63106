//! `mcp.json` configuration model.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};

/// Top-level MCP configuration: `{ "mcpServers": { ... }, "enabledMcpTools": [...] }`.
///
/// Without `enabledMcpTools` every discovered tool is enabled. With it, only
/// the listed tools are, named either plainly (`search`) or qualified by
/// server (`docs.search`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    #[serde(default)]
    mcp_servers: BTreeMap<String, McpServerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enabled_mcp_tools: Option<BTreeSet<String>>,
}

impl McpConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Json`] when the document is malformed.
    pub fn from_json(json: &str) -> McpResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Adds or replaces a server entry.
    #[must_use]
    pub fn with_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    /// Restricts dispatch to the named tools.
    #[must_use]
    pub fn with_enabled_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_mcp_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the tool allow-list, if one is configured.
    #[must_use]
    pub fn enabled_tools(&self) -> Option<&BTreeSet<String>> {
        self.enabled_mcp_tools.as_ref()
    }

    /// Returns whether `tool` on `server` may be dispatched.
    #[must_use]
    pub fn is_tool_enabled(&self, server: &str, tool: &str) -> bool {
        self.enabled_mcp_tools.as_ref().is_none_or(|allowed| {
            allowed.contains(tool) || allowed.contains(&format!("{server}.{tool}"))
        })
    }

    /// Returns every configured server keyed by name.
    #[must_use]
    pub fn servers(&self) -> &BTreeMap<String, McpServerConfig> {
        &self.mcp_servers
    }

    /// Returns a server entry.
    #[must_use]
    pub fn server(&self, name: &str) -> Option<&McpServerConfig> {
        self.mcp_servers.get(name)
    }

    /// Iterates over servers that are not disabled.
    pub fn enabled_servers(&self) -> impl Iterator<Item = (&str, &McpServerConfig)> {
        self.mcp_servers
            .iter()
            .filter(|(_, server)| !server.disabled)
            .map(|(name, server)| (name.as_str(), server))
    }
}

/// One entry of `mcpServers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    auto_approve: Vec<String>,
}

/// Transport selected by a server entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Spawn a subprocess speaking newline-delimited JSON-RPC.
    Stdio {
        /// Program to launch.
        command: String,
        /// Program arguments.
        args: Vec<String>,
        /// Environment overrides.
        env: BTreeMap<String, String>,
        /// Working directory.
        cwd: Option<PathBuf>,
    },
    /// POST JSON-RPC to an HTTP endpoint.
    Http {
        /// Endpoint URL.
        url: String,
    },
}

impl McpServerConfig {
    /// Server launched as a subprocess.
    #[must_use]
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Server reached over HTTP.
    #[must_use]
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Appends program arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the subprocess.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the subprocess working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Lists tools that skip user confirmation.
    #[must_use]
    pub fn with_auto_approve<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auto_approve.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Marks the server as disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Returns whether the server is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the auto-approved tool names.
    #[must_use]
    pub fn auto_approve(&self) -> &[String] {
        &self.auto_approve
    }

    /// Returns the transport this entry describes.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Config`] unless exactly one of `command` and `url`
    /// is set.
    pub fn transport(&self, server: &str) -> McpResult<TransportConfig> {
        match (&self.command, &self.url) {
            (Some(command), None) if !command.trim().is_empty() => Ok(TransportConfig::Stdio {
                command: command.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
                cwd: self.cwd.clone(),
            }),
            (None, Some(url)) if !url.trim().is_empty() => {
                Ok(TransportConfig::Http { url: url.clone() })
            }
            (Some(_), Some(_)) => Err(McpError::config(
                server,
                "`command` and `url` are mutually exclusive",
            )),
            _ => Err(McpError::config(server, "either `command` or `url` is required")),
        }
    }
}
