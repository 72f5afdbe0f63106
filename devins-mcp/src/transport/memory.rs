//! In-process MCP server for embedding hosts and tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Transport, TransportFactory};
use crate::config::McpServerConfig;
use crate::error::{McpError, McpResult};
use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, ToolDescriptor, methods,
};

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Tool body: receives the `arguments` object and returns text, or an error
/// message reported with `isError`.
pub type ToolHandler = Arc<dyn Fn(&Value) -> Result<String, String> + Send + Sync>;

/// Tools served from memory.
#[derive(Clone, Default)]
pub struct MemoryServer {
    tools: Vec<(ToolDescriptor, ToolHandler)>,
    page_size: Option<usize>,
    latency: Option<Duration>,
}

impl fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.tools.iter().map(|(tool, _)| tool.name.as_str()).collect();
        f.debug_struct("MemoryServer")
            .field("tools", &names)
            .field("page_size", &self.page_size)
            .field("latency", &self.latency)
            .finish()
    }
}

impl MemoryServer {
    /// Creates a server without tools.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool.
    #[must_use]
    pub fn with_tool<F>(mut self, name: &str, description: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<String, String> + Send + Sync + 'static,
    {
        let descriptor = ToolDescriptor {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: Some(json!({"type": "object"})),
        };
        self.tools.push((descriptor, Arc::new(handler)));
        self
    }

    /// Splits `tools/list` into pages of `size`.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Delays every response.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answers one request.
    #[must_use]
    pub fn handle(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id().unwrap_or_default();
        match request.method() {
            methods::INITIALIZE => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "memory", "version": "0"},
                }),
            ),
            methods::LIST_TOOLS => self.list(id, request.params()),
            methods::CALL_TOOL => self.call(id, request.params()),
            other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("unknown method {other}")),
        }
    }

    fn list(&self, id: u64, params: Option<&Value>) -> JsonRpcResponse {
        let start = params
            .and_then(|p| p.get("cursor"))
            .and_then(Value::as_str)
            .and_then(|cursor| cursor.parse::<usize>().ok())
            .unwrap_or(0);
        let size = self.page_size.unwrap_or(usize::MAX);
        let page: Vec<_> = self
            .tools
            .iter()
            .skip(start)
            .take(size)
            .map(|(tool, _)| tool)
            .collect();
        let next = start.saturating_add(size);

        let mut result = json!({ "tools": page });
        if next < self.tools.len() {
            result["nextCursor"] = Value::String(next.to_string());
        }
        JsonRpcResponse::success(id, result)
    }

    fn call(&self, id: u64, params: Option<&Value>) -> JsonRpcResponse {
        let name = params.and_then(|p| p.get("name")).and_then(Value::as_str);
        let Some((_, handler)) = self
            .tools
            .iter()
            .find(|(tool, _)| Some(tool.name.as_str()) == name)
        else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, format!("unknown tool {name:?}"));
        };

        let empty = json!({});
        let arguments = params.and_then(|p| p.get("arguments")).unwrap_or(&empty);
        match handler(arguments) {
            Ok(text) => JsonRpcResponse::success(
                id,
                json!({"content": [{"type": "text", "text": text}]}),
            ),
            Err(message) => JsonRpcResponse::success(
                id,
                json!({"content": [{"type": "text", "text": message}], "isError": true}),
            ),
        }
    }
}

/// Transport delivering requests straight to a [`MemoryServer`].
#[derive(Debug)]
pub struct MemoryTransport {
    server: MemoryServer,
    closed: bool,
}

impl MemoryTransport {
    /// Connects to `server`.
    #[must_use]
    pub fn new(server: MemoryServer) -> Self {
        Self {
            server,
            closed: false,
        }
    }

    fn ensure_open(&self) -> McpResult<()> {
        if self.closed {
            return Err(McpError::transport("memory transport is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request(&mut self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        self.ensure_open()?;
        if let Some(latency) = self.server.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.server.handle(&request))
    }

    async fn notify(&mut self, _notification: JsonRpcRequest) -> McpResult<()> {
        self.ensure_open()
    }

    async fn close(&mut self) -> McpResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Factory resolving server names to [`MemoryServer`]s. Names without a
/// server behave like unreachable endpoints.
#[derive(Debug, Default)]
pub struct MemoryTransportFactory {
    servers: BTreeMap<String, MemoryServer>,
    opened: Mutex<Vec<String>>,
}

impl MemoryTransportFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `server` under `name`.
    #[must_use]
    pub fn with_server(mut self, name: impl Into<String>, server: MemoryServer) -> Self {
        self.servers.insert(name.into(), server);
        self
    }

    /// Returns how many transports were opened for `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn open_count(&self, name: &str) -> usize {
        self.opened
            .lock()
            .expect("memory transport factory poisoned")
            .iter()
            .filter(|opened| opened.as_str() == name)
            .count()
    }
}

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    async fn open(&self, server: &str, _config: &McpServerConfig) -> McpResult<Box<dyn Transport>> {
        self.opened
            .lock()
            .expect("memory transport factory poisoned")
            .push(server.to_string());
        let memory = self
            .servers
            .get(server)
            .cloned()
            .ok_or_else(|| McpError::transport(format!("connection to `{server}` refused")))?;
        Ok(Box::new(MemoryTransport::new(memory)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> MemoryServer {
        MemoryServer::new()
            .with_tool("echo", "Echo text", |args| {
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            })
            .with_tool("fail", "Always fails", |_| Err("nope".into()))
            .with_page_size(1)
    }

    #[test]
    fn paginates_tool_list() {
        let server = server();
        let first = server
            .handle(&JsonRpcRequest::new(1, methods::LIST_TOOLS, None))
            .into_result()
            .unwrap();
        assert_eq!(first["tools"][0]["name"], "echo");
        assert_eq!(first["nextCursor"], "1");

        let second = server
            .handle(&JsonRpcRequest::new(
                2,
                methods::LIST_TOOLS,
                Some(json!({"cursor": "1"})),
            ))
            .into_result()
            .unwrap();
        assert_eq!(second["tools"][0]["name"], "fail");
        assert!(second.get("nextCursor").is_none());
    }

    #[tokio::test]
    async fn closed_transport_rejects_requests() {
        let mut transport = MemoryTransport::new(server());
        let call = JsonRpcRequest::new(
            1,
            methods::CALL_TOOL,
            Some(json!({"name": "echo", "arguments": {"text": "hi"}})),
        );
        let result = transport.request(call.clone()).await.unwrap().into_result().unwrap();
        assert_eq!(result["content"][0]["text"], "hi");

        transport.close().await.unwrap();
        assert!(transport.request(call).await.is_err());
    }
}
