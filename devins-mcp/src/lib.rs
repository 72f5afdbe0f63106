//! Model Context Protocol client side for DevIns.
//!
//! [`McpClientManager`] reads an [`McpConfig`] (the `mcpServers` map of
//! `mcp.json`), connects to each enabled server through a [`Transport`],
//! caches the tools every server exposes and executes them on request. A
//! server that cannot be reached is marked disconnected without affecting the
//! others.

#![warn(missing_docs, clippy::pedantic)]

mod client;
mod config;
mod error;
mod manager;
pub mod protocol;
mod status;
pub mod transport;

pub use client::McpClient;
pub use config::{McpConfig, McpServerConfig, TransportConfig};
pub use error::{McpError, McpResult};
pub use manager::{
    DEFAULT_MAX_CONCURRENT_CONNECTIONS, DEFAULT_REQUEST_TIMEOUT, McpClientManager, McpToolInfo,
    arguments_from_params,
};
pub use status::{McpDiscoveryState, McpServerStatus, ServerLifecycle, StatusEvent};
pub use transport::{
    DefaultTransportFactory, MemoryServer, MemoryTransportFactory, StdioOptions, Transport,
    TransportFactory,
};
