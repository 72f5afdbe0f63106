//! Parse diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::Span;

/// Problems the parser recovers from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// `/name:` written with nothing after the colon.
    #[error("command `/{command}` expects a value after `:`")]
    EmptyCommandValue {
        /// Command identifier.
        command: String,
    },
    /// Input ended inside a code fence.
    #[error("code block is missing its closing ```")]
    UnterminatedFence,
    /// `${name` without `}`.
    #[error("variable `${{{name}` is missing its closing `}}`")]
    UnterminatedVariable {
        /// Variable name.
        name: String,
    },
    /// `@"name` without a closing quote.
    #[error("agent name `{name}` is missing its closing quote")]
    UnterminatedQuote {
        /// Partial agent name.
        name: String,
    },
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Compilation proceeds normally.
    Warning,
    /// The affected node is partial.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// A positioned message produced while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl Diagnostic {
    /// Creates an error diagnostic at the span's start.
    #[must_use]
    pub fn error(error: &ParseError, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: error.to_string(),
            line: span.line,
            column: span.column,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.line, self.column, self.severity, self.message
        )
    }
}
