//! Lexer, syntax tree, and parser for the DevIns command language.
//!
//! DevIns embeds `/command:value` invocations, `@agent` mentions, `$variable`
//! references and fenced code blocks inside free-form prompt text. Parsing is
//! fault tolerant: [`parse`] always returns a document, with any recovered
//! problems reported as [`Diagnostic`]s.

#![warn(missing_docs, clippy::pedantic)]

mod ast;
mod diagnostic;
mod lexer;
mod parser;
mod token;

/// Syntax tree types.
pub use ast::{CodeBlockNode, Document, Node, UsedKind, UsedNode, VariableNode};
/// Recoverable parse problems.
pub use diagnostic::{Diagnostic, ParseError, Severity};
/// Tokeniser.
pub use lexer::Lexer;
/// Parser entry point.
pub use parser::{ParseOutput, parse};
/// Token types.
pub use token::{Span, Token, TokenKind};
