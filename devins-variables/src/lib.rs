//! Variable resolution for DevIns `$name` references.
//!
//! A [`ResolverChain`] queries its resolvers in declared order and the first
//! one claiming a name supplies the value. Resolution never fails: unknown
//! names and resolver errors produce the empty string plus a
//! [`ResolutionWarning`]. Every produced value is recorded in the chain's
//! [`SnapshotLog`].

#![warn(missing_docs, clippy::pedantic)]

mod context;
mod error;
mod pipeline;
mod resolver;
mod snapshot;
mod system;
mod toolchain;

pub use context::{ContextResolver, EditorContext};
pub use error::{ResolveError, ResolveResult};
pub use pipeline::{Pipeline, PipelineAction, PipelineResolver, PipelineSource};
pub use resolver::{Resolution, ResolutionWarning, ResolveContext, ResolverChain, VariableResolver};
pub use snapshot::{SnapshotEntry, SnapshotLog};
pub use system::SystemInfoResolver;
pub use toolchain::ToolchainResolver;
