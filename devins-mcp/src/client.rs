//! Client session bound to one MCP server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{McpError, McpResult};
use crate::protocol::{
    CallToolResult, JsonRpcRequest, ListToolsResult, ToolDescriptor, initialize_params, methods,
};
use crate::transport::Transport;

/// Upper bound on `tools/list` pages followed for one listing.
const MAX_LIST_PAGES: usize = 64;

const CLIENT_NAME: &str = "devins";

/// Initialised MCP session. Requests are serialised and time-bounded.
pub struct McpClient {
    server: String,
    transport: Mutex<Box<dyn Transport>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server", &self.server)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Runs the `initialize` handshake over `transport`.
    ///
    /// # Errors
    ///
    /// Returns the transport, protocol or timeout error that aborted the
    /// handshake.
    pub async fn connect(
        server: impl Into<String>,
        transport: Box<dyn Transport>,
        request_timeout: Duration,
    ) -> McpResult<Self> {
        let client = Self {
            server: server.into(),
            transport: Mutex::new(transport),
            next_id: AtomicU64::new(1),
            timeout: request_timeout,
        };

        let info = client
            .call(
                methods::INITIALIZE,
                Some(initialize_params(CLIENT_NAME, env!("CARGO_PKG_VERSION"))),
            )
            .await?;
        debug!(
            server = %client.server,
            protocol = info.get("protocolVersion").and_then(|v| v.as_str()),
            "mcp handshake complete"
        );
        client.notify(methods::INITIALIZED).await?;
        Ok(client)
    }

    /// Returns the server name.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Lists every tool, following pagination cursors.
    ///
    /// # Errors
    ///
    /// Propagates request failures and malformed listings.
    pub async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|cursor| json!({ "cursor": cursor }));
            let page: ListToolsResult =
                serde_json::from_value(self.call(methods::LIST_TOOLS, params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(McpError::protocol(format!(
            "`{}` returned more than {MAX_LIST_PAGES} tool pages",
            self.server
        )))
    }

    /// Invokes `name` with the supplied arguments object.
    ///
    /// # Errors
    ///
    /// Propagates request failures and malformed results.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.call(methods::CALL_TOOL, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Closes the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's close error or [`McpError::Timeout`].
    pub async fn close(&self) -> McpResult<()> {
        let mut transport = self.transport.lock().await;
        timeout(self.timeout, transport.close())
            .await
            .map_err(|_| self.timeout_error("close"))?
    }

    async fn call(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);

        let mut transport = self.transport.lock().await;
        let response = timeout(self.timeout, transport.request(request))
            .await
            .map_err(|_| self.timeout_error(method))??;
        response.into_result()
    }

    async fn notify(&self, method: &str) -> McpResult<()> {
        let mut transport = self.transport.lock().await;
        timeout(
            self.timeout,
            transport.notify(JsonRpcRequest::notification(method, None)),
        )
        .await
        .map_err(|_| self.timeout_error(method))?
    }

    fn timeout_error(&self, method: &str) -> McpError {
        McpError::Timeout {
            server: self.server.clone(),
            method: method.to_string(),
            millis: self.timeout.as_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryServer, MemoryTransport};

    fn transport(server: MemoryServer) -> Box<dyn Transport> {
        Box::new(MemoryTransport::new(server))
    }

    #[tokio::test]
    async fn lists_all_pages_and_calls_tools() {
        let server = MemoryServer::new()
            .with_tool("a", "first", |_| Ok("A".into()))
            .with_tool("b", "second", |_| Ok("B".into()))
            .with_tool("c", "third", |args| Ok(args.to_string()))
            .with_page_size(2);
        let client = McpClient::connect("mem", transport(server), Duration::from_secs(1))
            .await
            .unwrap();

        let names: Vec<_> = client
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);

        let result = client.call_tool("c", json!({"x": 1})).await.unwrap();
        assert_eq!(result.first_text().unwrap(), r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn unknown_tool_is_rpc_error() {
        let client = McpClient::connect("mem", transport(MemoryServer::new()), Duration::from_secs(1))
            .await
            .unwrap();
        let err = client.call_tool("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32602, .. }));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MemoryServer::new().with_latency(Duration::from_millis(200));
        let err = McpClient::connect("slow", transport(server), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout { ref method, .. } if method == "initialize"));
    }
}
