//! Connection status state machine for a single MCP server.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{McpError, McpResult};

/// Connection status of an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum McpServerStatus {
    /// No connection attempt has been made.
    NotStarted,
    /// Transport is being opened and the handshake is running.
    Connecting,
    /// Handshake finished; tools can be listed and called.
    Connected,
    /// The client is being closed.
    Disconnecting,
    /// Closed, or the last attempt failed.
    Disconnected,
}

impl McpServerStatus {
    /// Returns `true` when the server accepts tool calls.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for McpServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "not started",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

/// Events driving [`ServerLifecycle`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Start connecting.
    Connect,
    /// Handshake completed.
    Established,
    /// Connecting or closing failed.
    Failed,
    /// Begin closing a live client.
    Close,
    /// Closing finished.
    Closed,
}

/// Progress of a manager-wide discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum McpDiscoveryState {
    /// Discovery has never run.
    #[default]
    NotStarted,
    /// Discovery is running.
    InProgress,
    /// The last discovery pass finished.
    Completed,
}

/// Status tracker for one server.
#[derive(Debug, Clone)]
pub struct ServerLifecycle {
    server: String,
    status: McpServerStatus,
}

impl ServerLifecycle {
    /// Creates a tracker in [`McpServerStatus::NotStarted`].
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            status: McpServerStatus::NotStarted,
        }
    }

    /// Returns the server name.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> McpServerStatus {
        self.status
    }

    /// Applies an event, returning the resulting status.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::InvalidTransition`] when the event is not allowed
    /// from the current status.
    pub fn transition(&mut self, event: StatusEvent) -> McpResult<McpServerStatus> {
        use McpServerStatus::{Connected, Connecting, Disconnected, Disconnecting, NotStarted};

        let next = match (self.status, event) {
            (NotStarted | Disconnected, StatusEvent::Connect) => Some(Connecting),
            (Connecting, StatusEvent::Established) => Some(Connected),
            (Connected, StatusEvent::Close) => Some(Disconnecting),
            (Disconnecting, StatusEvent::Closed)
            | (Connecting | Connected | Disconnecting, StatusEvent::Failed) => Some(Disconnected),
            _ => None,
        };

        let Some(next_status) = next else {
            return Err(McpError::InvalidTransition {
                server: self.server.clone(),
                from: self.status,
                event,
            });
        };

        debug!(
            server = %self.server,
            from = %self.status,
            to = %next_status,
            ?event,
            "mcp server status transition"
        );
        self.status = next_status;
        Ok(next_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_close_flow() {
        let mut lifecycle = ServerLifecycle::new("files");
        assert_eq!(lifecycle.status(), McpServerStatus::NotStarted);

        lifecycle.transition(StatusEvent::Connect).unwrap();
        lifecycle.transition(StatusEvent::Established).unwrap();
        assert!(lifecycle.status().is_connected());

        lifecycle.transition(StatusEvent::Close).unwrap();
        assert_eq!(lifecycle.status(), McpServerStatus::Disconnecting);
        lifecycle.transition(StatusEvent::Closed).unwrap();
        assert_eq!(lifecycle.status(), McpServerStatus::Disconnected);
    }

    #[test]
    fn failed_connect_can_retry() {
        let mut lifecycle = ServerLifecycle::new("files");
        lifecycle.transition(StatusEvent::Connect).unwrap();
        lifecycle.transition(StatusEvent::Failed).unwrap();
        assert_eq!(lifecycle.status(), McpServerStatus::Disconnected);

        lifecycle.transition(StatusEvent::Connect).unwrap();
        assert_eq!(lifecycle.status(), McpServerStatus::Connecting);
    }

    #[test]
    fn invalid_transition_errors() {
        let mut lifecycle = ServerLifecycle::new("files");
        let err = lifecycle
            .transition(StatusEvent::Established)
            .expect_err("cannot establish before connecting");
        assert!(matches!(
            err,
            McpError::InvalidTransition {
                from: McpServerStatus::NotStarted,
                event: StatusEvent::Established,
                ..
            }
        ));

        lifecycle.transition(StatusEvent::Connect).unwrap();
        assert!(lifecycle.transition(StatusEvent::Connect).is_err());
        assert!(lifecycle.transition(StatusEvent::Close).is_err());
    }
}
