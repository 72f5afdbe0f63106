//! Connection and tool-discovery manager across configured MCP servers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tracing::{debug, error, info, warn};

use crate::client::McpClient;
use crate::config::{McpConfig, McpServerConfig};
use crate::error::{McpError, McpResult};
use crate::status::{McpDiscoveryState, McpServerStatus, ServerLifecycle, StatusEvent};
use crate::transport::{DefaultTransportFactory, TransportFactory};

/// Default bound on servers connected at the same time.
pub const DEFAULT_MAX_CONCURRENT_CONNECTIONS: usize = 4;

/// Default deadline for a single MCP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tool discovered on a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolInfo {
    /// Tool name as exposed by the server.
    pub name: String,
    /// Description, empty when the server sent none.
    pub description: String,
    /// Name of the providing server.
    pub server_name: String,
    /// JSON schema of the arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Whether the tool may be dispatched.
    pub enabled: bool,
}

impl McpToolInfo {
    /// Returns `server.tool`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.server_name, self.name)
    }
}

/// Converts string parameters into a JSON arguments object. Values that parse
/// as JSON objects, arrays, numbers or booleans are passed as such; anything
/// else stays a string.
#[must_use]
pub fn arguments_from_params(params: &BTreeMap<String, String>) -> Value {
    let object: Map<String, Value> = params
        .iter()
        .map(|(key, raw)| {
            let value = match serde_json::from_str::<Value>(raw.trim()) {
                Ok(
                    parsed @ (Value::Object(_)
                    | Value::Array(_)
                    | Value::Number(_)
                    | Value::Bool(_)),
                ) => parsed,
                _ => Value::String(raw.clone()),
            };
            (key.clone(), value)
        })
        .collect();
    Value::Object(object)
}

/// Owns one client per connected server and the tools each exposes.
pub struct McpClientManager {
    config: RwLock<McpConfig>,
    factory: Arc<dyn TransportFactory>,
    clients: Mutex<HashMap<String, Arc<OnceCell<Arc<McpClient>>>>>,
    statuses: RwLock<BTreeMap<String, ServerLifecycle>>,
    tools: RwLock<BTreeMap<String, Vec<McpToolInfo>>>,
    discovery: RwLock<McpDiscoveryState>,
    max_concurrent: usize,
    request_timeout: Duration,
}

impl std::fmt::Debug for McpClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientManager")
            .field("statuses", &self.all_server_statuses())
            .field("discovery", &self.discovery_state())
            .finish_non_exhaustive()
    }
}

impl McpClientManager {
    /// Creates a manager using the default stdio/HTTP transports.
    #[must_use]
    pub fn new(config: McpConfig) -> Self {
        Self {
            config: RwLock::new(config),
            factory: Arc::new(DefaultTransportFactory::default()),
            clients: Mutex::new(HashMap::new()),
            statuses: RwLock::new(BTreeMap::new()),
            tools: RwLock::new(BTreeMap::new()),
            discovery: RwLock::new(McpDiscoveryState::NotStarted),
            max_concurrent: DEFAULT_MAX_CONCURRENT_CONNECTIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Replaces the transport factory.
    #[must_use]
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Bounds how many servers are connected concurrently.
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replaces the configuration. Live clients are kept.
    ///
    /// # Panics
    ///
    /// Panics if the configuration lock is poisoned.
    pub fn initialize(&self, config: McpConfig) {
        *self.config.write().expect("mcp config poisoned") = config;
    }

    fn server_config(&self, server: &str) -> Option<McpServerConfig> {
        self.config
            .read()
            .expect("mcp config poisoned")
            .server(server)
            .cloned()
    }

    /// Connects to every enabled server and lists its tools. Servers are
    /// processed concurrently; a failing server is logged, marked
    /// disconnected and left out of the result.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn discover_all_tools(&self) -> BTreeMap<String, Vec<McpToolInfo>> {
        let servers: Vec<(String, McpServerConfig)> = self
            .config
            .read()
            .expect("mcp config poisoned")
            .enabled_servers()
            .map(|(name, config)| (name.to_string(), config.clone()))
            .collect();

        self.set_discovery(McpDiscoveryState::InProgress);
        info!(servers = servers.len(), "discovering mcp tools");

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let attempts = servers.iter().map(|(name, config)| {
            let permits = Arc::clone(&permits);
            async move {
                let _permit = permits.acquire().await;
                (name.clone(), self.connect_and_list(name, config).await)
            }
        });

        let mut discovered = BTreeMap::new();
        for (name, outcome) in join_all(attempts).await {
            match outcome {
                Ok(tools) => {
                    discovered.insert(name, tools);
                }
                Err(err) => error!(server = %name, error = %err, "mcp server discovery failed"),
            }
        }

        self.set_discovery(McpDiscoveryState::Completed);
        info!(
            connected = discovered.len(),
            tools = discovered.values().map(Vec::len).sum::<usize>(),
            "mcp discovery finished"
        );
        discovered
    }

    /// Connects to one server (if needed) and lists its tools. Disabled
    /// servers yield no tools.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnknownServer`] for names missing from the
    /// configuration, or the connection error.
    pub async fn discover_server_tools(&self, server: &str) -> McpResult<Vec<McpToolInfo>> {
        let config = self
            .server_config(server)
            .ok_or_else(|| McpError::UnknownServer {
                server: server.to_string(),
            })?;
        if config.is_disabled() {
            return Ok(Vec::new());
        }
        self.connect_and_list(server, &config).await
    }

    async fn connect_and_list(
        &self,
        server: &str,
        config: &McpServerConfig,
    ) -> McpResult<Vec<McpToolInfo>> {
        let client = match self.client(server).await {
            Some(client) => client,
            None => self.connect(server, config).await?,
        };

        let tools: Vec<McpToolInfo> = match client.list_tools().await {
            Ok(listed) => {
                let config = self.config.read().expect("mcp config poisoned");
                listed
                    .into_iter()
                    .map(|tool| McpToolInfo {
                        enabled: config.is_tool_enabled(server, &tool.name),
                        name: tool.name,
                        description: tool.description.unwrap_or_default(),
                        server_name: server.to_string(),
                        input_schema: tool.input_schema,
                    })
                    .collect()
            }
            Err(err) => {
                self.drop_client(server, &client).await;
                return Err(err);
            }
        };

        debug!(
            server,
            tools = tools.len(),
            enabled = tools.iter().filter(|tool| tool.enabled).count(),
            "listed mcp tools"
        );
        self.tools
            .write()
            .expect("mcp tools poisoned")
            .insert(server.to_string(), tools.clone());
        Ok(tools)
    }

    async fn connect(&self, server: &str, config: &McpServerConfig) -> McpResult<Arc<McpClient>> {
        let slot = Arc::clone(self.clients.lock().await.entry(server.to_string()).or_default());

        // Concurrent callers for the same server wait on the one handshake.
        slot.get_or_try_init(|| async {
            self.transition(server, StatusEvent::Connect)?;
            let opened = match self.factory.open(server, config).await {
                Ok(transport) => McpClient::connect(server, transport, self.request_timeout).await,
                Err(err) => Err(err),
            };
            match opened {
                Ok(client) => {
                    self.transition(server, StatusEvent::Established)?;
                    Ok(Arc::new(client))
                }
                Err(err) => {
                    let _ = self.transition(server, StatusEvent::Failed);
                    Err(err)
                }
            }
        })
        .await
        .map(Arc::clone)
    }

    async fn drop_client(&self, server: &str, client: &McpClient) {
        self.clients.lock().await.remove(server);
        if let Err(err) = client.close().await {
            debug!(server, error = %err, "closing failed mcp client");
        }
        let _ = self.transition(server, StatusEvent::Failed);
    }

    async fn client(&self, server: &str) -> Option<Arc<McpClient>> {
        self.clients
            .lock()
            .await
            .get(server)
            .and_then(|slot| slot.get().cloned())
    }

    /// Calls `tool` on `server` and returns the first content item as text
    /// (non-text items as JSON).
    ///
    /// # Errors
    ///
    /// Returns [`McpError::NoClient`] when the server is not connected,
    /// [`McpError::UnknownTool`] when discovery did not report the tool,
    /// [`McpError::ToolFailed`] when the tool reports an error, or the
    /// request error.
    pub async fn execute_tool(&self, server: &str, tool: &str, arguments: Value) -> McpResult<String> {
        let client = self.client(server).await.ok_or_else(|| McpError::NoClient {
            server: server.to_string(),
        })?;
        let known = self
            .tools
            .read()
            .expect("mcp tools poisoned")
            .get(server)
            .is_some_and(|tools| tools.iter().any(|info| info.name == tool));
        if !known {
            return Err(McpError::UnknownTool {
                server: server.to_string(),
                tool: tool.to_string(),
            });
        }

        debug!(server, tool, "calling mcp tool");
        let result = client.call_tool(tool, arguments).await?;
        let text = result.first_text()?;
        if result.is_error {
            warn!(server, tool, "mcp tool reported an error");
            return Err(McpError::ToolFailed {
                tool: tool.to_string(),
                message: text,
            });
        }
        Ok(text)
    }

    /// Resolves `server.tool`, or an unqualified name exposed by exactly one
    /// server.
    ///
    /// # Panics
    ///
    /// Panics if the tool cache lock is poisoned.
    #[must_use]
    pub fn find_tool(&self, name: &str) -> Option<McpToolInfo> {
        let tools = self.tools.read().expect("mcp tools poisoned");

        if let Some((server, tool)) = name.split_once('.') {
            if let Some(found) = tools
                .get(server)
                .and_then(|list| list.iter().find(|info| info.name == tool))
            {
                return Some(found.clone());
            }
        }

        let mut matches = tools.values().flatten().filter(|info| info.name == name);
        let first = matches.next()?;
        if matches.next().is_some() {
            debug!(tool = name, "ambiguous mcp tool name");
            return None;
        }
        Some(first.clone())
    }

    /// Returns every discovered tool, grouped by server.
    ///
    /// # Panics
    ///
    /// Panics if the tool cache lock is poisoned.
    #[must_use]
    pub fn tools(&self) -> BTreeMap<String, Vec<McpToolInfo>> {
        self.tools.read().expect("mcp tools poisoned").clone()
    }

    /// Returns the status of one server.
    ///
    /// # Panics
    ///
    /// Panics if the status lock is poisoned.
    #[must_use]
    pub fn server_status(&self, server: &str) -> McpServerStatus {
        self.statuses
            .read()
            .expect("mcp statuses poisoned")
            .get(server)
            .map_or(McpServerStatus::NotStarted, ServerLifecycle::status)
    }

    /// Returns the status of every server that has been contacted.
    ///
    /// # Panics
    ///
    /// Panics if the status lock is poisoned.
    #[must_use]
    pub fn all_server_statuses(&self) -> BTreeMap<String, McpServerStatus> {
        self.statuses
            .read()
            .expect("mcp statuses poisoned")
            .iter()
            .map(|(name, lifecycle)| (name.clone(), lifecycle.status()))
            .collect()
    }

    /// Returns the progress of discovery.
    ///
    /// # Panics
    ///
    /// Panics if the discovery lock is poisoned.
    #[must_use]
    pub fn discovery_state(&self) -> McpDiscoveryState {
        *self.discovery.read().expect("mcp discovery poisoned")
    }

    /// Returns `true` when `tool` is listed in the server's `autoApprove`.
    #[must_use]
    pub fn auto_approved(&self, server: &str, tool: &str) -> bool {
        self.server_config(server)
            .is_some_and(|config| config.auto_approve().iter().any(|name| name == tool))
    }

    /// Closes every client. A failure closing one client is logged and does
    /// not stop the others.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn shutdown(&self) {
        let slots: Vec<_> = self.clients.lock().await.drain().collect();
        let clients = slots
            .into_iter()
            .filter_map(|(server, slot)| slot.get().cloned().map(|client| (server, client)));

        for (server, client) in clients {
            let _ = self.transition(&server, StatusEvent::Close);
            match client.close().await {
                Ok(()) => {
                    let _ = self.transition(&server, StatusEvent::Closed);
                }
                Err(err) => {
                    error!(server = %server, error = %err, "failed to close mcp client");
                    let _ = self.transition(&server, StatusEvent::Failed);
                }
            }
        }

        self.tools.write().expect("mcp tools poisoned").clear();
        info!("mcp clients shut down");
    }

    fn transition(&self, server: &str, event: StatusEvent) -> McpResult<McpServerStatus> {
        self.statuses
            .write()
            .expect("mcp statuses poisoned")
            .entry(server.to_string())
            .or_insert_with(|| ServerLifecycle::new(server))
            .transition(event)
    }

    fn set_discovery(&self, state: McpDiscoveryState) {
        *self.discovery.write().expect("mcp discovery poisoned") = state;
    }
}
