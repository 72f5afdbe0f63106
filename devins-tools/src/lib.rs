//! Tool registry and built-in tools for DevIns commands.
//!
//! Every `/command` in a DevIns document is dispatched through a
//! [`ToolRegistry`]. The built-in table ([`builtin::standard_registry`]) covers
//! file access, search, process execution and version control; each tool only
//! touches the host through the collaborator traits of
//! [`devins_primitives::workspace`].

#![warn(missing_docs, clippy::pedantic)]

pub mod builtin;
pub mod local;
pub mod registry;

pub use builtin::{ToolCollaborators, register_builtins, standard_registry};
pub use local::{GitCli, LocalFileSystem, TokioProcessLauncher};
pub use registry::{
    CONTENT_PARAM, Tool, ToolError, ToolHandle, ToolInput, ToolMetadata, ToolOutput, ToolRegistry,
    ToolResult,
};
