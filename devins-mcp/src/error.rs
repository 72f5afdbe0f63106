//! Error types for MCP configuration, transports and clients.

use thiserror::Error;

use crate::status::{McpServerStatus, StatusEvent};

/// Result alias used across the MCP crate.
pub type McpResult<T> = Result<T, McpError>;

/// Errors raised while talking to MCP servers.
#[derive(Debug, Error)]
pub enum McpError {
    /// Server configuration is unusable.
    #[error("invalid MCP configuration for `{server}`: {reason}")]
    Config {
        /// Server name.
        server: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The server is not present in the configuration.
    #[error("MCP server `{server}` is not configured")]
    UnknownServer {
        /// Server name.
        server: String,
    },

    /// No live client exists for the server.
    #[error("no client connected for MCP server `{server}`")]
    NoClient {
        /// Server name.
        server: String,
    },

    /// The server does not expose the requested tool.
    #[error("MCP server `{server}` has no tool `{tool}`")]
    UnknownTool {
        /// Server name.
        server: String,
        /// Tool name.
        tool: String,
    },

    /// The transport failed to deliver or receive a message.
    #[error("MCP transport error: {reason}")]
    Transport {
        /// Human-readable reason.
        reason: String,
    },

    /// The peer sent something that is not valid MCP.
    #[error("MCP protocol error: {reason}")]
    Protocol {
        /// Human-readable reason.
        reason: String,
    },

    /// The server answered with a JSON-RPC error object.
    #[error("MCP server returned error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// The tool ran but reported failure.
    #[error("MCP tool `{tool}` failed: {message}")]
    ToolFailed {
        /// Tool name.
        tool: String,
        /// Text reported by the server.
        message: String,
    },

    /// A request exceeded its deadline.
    #[error("MCP request `{method}` to `{server}` timed out after {millis}ms")]
    Timeout {
        /// Server name.
        server: String,
        /// JSON-RPC method.
        method: String,
        /// Deadline in milliseconds.
        millis: u128,
    },

    /// A server status change was not allowed.
    #[error("invalid status transition for `{server}` from {from:?} via {event:?}")]
    InvalidTransition {
        /// Server name.
        server: String,
        /// Status prior to the transition.
        from: McpServerStatus,
        /// Event that was rejected.
        event: StatusEvent,
    },

    /// JSON encoding or decoding failed.
    #[error("MCP JSON error: {source}")]
    Json {
        /// Source error.
        #[from]
        source: serde_json::Error,
    },

    /// Process or pipe I/O failed.
    #[error("MCP i/o error: {source}")]
    Io {
        /// Source error.
        #[from]
        source: std::io::Error,
    },
}

impl McpError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Creates a configuration error for `server`.
    #[must_use]
    pub fn config(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            server: server.into(),
            reason: reason.into(),
        }
    }
}
