//! DevIns compiler.
//!
//! [`Compiler::compile`] parses DevIns source, resolves `$variables` through
//! a [`ResolverChain`](devins_variables::ResolverChain) and turns every
//! `/command` and `@agent` node into a [`ToolCall`](devins_primitives::ToolCall).
//! Each call is checked by the injected policy engine before it runs on a
//! built-in tool or an MCP server. The walk is sequential and never fails:
//! denials and tool errors become inline markers and diagnostics on the
//! returned [`CompileResult`].

#![warn(missing_docs, clippy::pedantic)]

mod cancel;
mod compiler;
mod dispatch;
mod error;
mod hooks;
mod options;
mod result;

pub use cancel::CancellationToken;
pub use compiler::Compiler;
pub use dispatch::DEFAULT_ARG_PARAM;
pub use error::CompileError;
pub use hooks::{AgentRunner, CompositeDecisionObserver, DecisionObserver, TracingDecisionObserver};
pub use options::CompilerOptions;
pub use result::{CompileResult, CompileStatistics, ERROR_MARKER};
