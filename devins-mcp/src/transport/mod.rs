//! Message transports between the client and an MCP server.

mod http;
mod http_client;
mod memory;
mod stdio;

use async_trait::async_trait;

use crate::config::{McpServerConfig, TransportConfig};
use crate::error::McpResult;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

pub use http::HttpTransport;
pub use memory::{MemoryServer, MemoryTransport, MemoryTransportFactory, ToolHandler};
pub use stdio::{StdioOptions, StdioTransport, login_shell_env};

/// Bidirectional JSON-RPC channel to one server.
///
/// Callers serialise access; implementations may assume one request in flight.
#[async_trait]
pub trait Transport: Send {
    /// Sends a request and waits for the response with the same id.
    async fn request(&mut self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse>;

    /// Sends a notification without waiting for a reply.
    async fn notify(&mut self, notification: JsonRpcRequest) -> McpResult<()>;

    /// Releases the underlying resources.
    async fn close(&mut self) -> McpResult<()>;
}

/// Opens transports for configured servers.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Opens a transport for `server`.
    async fn open(&self, server: &str, config: &McpServerConfig) -> McpResult<Box<dyn Transport>>;
}

/// Factory spawning stdio servers and building HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct DefaultTransportFactory {
    stdio: StdioOptions,
}

impl DefaultTransportFactory {
    /// Creates a factory with the supplied stdio options.
    #[must_use]
    pub fn new(stdio: StdioOptions) -> Self {
        Self { stdio }
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn open(&self, server: &str, config: &McpServerConfig) -> McpResult<Box<dyn Transport>> {
        match config.transport(server)? {
            TransportConfig::Stdio {
                command,
                args,
                env,
                cwd,
            } => {
                let transport =
                    StdioTransport::spawn(&command, &args, &env, cwd.as_deref(), &self.stdio)
                        .await?;
                Ok(Box::new(transport))
            }
            TransportConfig::Http { url } => Ok(Box::new(HttpTransport::new(&url)?)),
        }
    }
}
