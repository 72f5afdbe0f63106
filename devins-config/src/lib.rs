//! Configuration management for DevIns hosts.
//!
//! Configuration lives in one directory, `$DEVINS_CONFIG_DIR` or
//! `$HOME/.autodev`: `mcp.json` declares MCP servers and `devins.json` holds
//! [`CompilerSettings`]. Either file may be absent.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{CONFIG_DIR_ENV, ConfigLoader, DevinsConfig, MCP_FILE, SETTINGS_FILE};
pub use schema::CompilerSettings;
