//! DevIns facade.
//!
//! Depend on this crate via `cargo add devins`. It bundles the DevIns crates
//! behind feature flags: the command-language parser, variable resolvers, the
//! policy engine, built-in tools, the MCP client and the compiler tying them
//! together.

#![warn(missing_docs, clippy::pedantic)]

/// Shared primitives: tool calls, identifiers and workspace collaborators.
pub use devins_primitives as primitives;

/// Lexer, parser and syntax tree (enabled by `lang` feature).
#[cfg(feature = "lang")]
pub use devins_lang as lang;

/// `$variable` resolvers and pipelines (enabled by `variables` feature).
#[cfg(feature = "variables")]
pub use devins_variables as variables;

/// Rule-based tool policy (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use devins_policy as policy;

/// Tool registry and built-in tools (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use devins_tools as tools;

/// MCP client and connection manager (enabled by `mcp` feature).
#[cfg(feature = "mcp")]
pub use devins_mcp as mcp;

/// DevIns compiler (enabled by `compiler` feature).
#[cfg(feature = "compiler")]
pub use devins_compiler as compiler;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use devins_config as config;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use devins_telemetry as telemetry;
