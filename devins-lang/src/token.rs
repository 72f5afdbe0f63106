//! Lexer token types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Token kinds produced by the DevIns lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Free-form prose.
    Text,
    /// A single `\n`.
    Newline,
    /// `@` introducing an agent mention.
    AgentStart,
    /// `/` introducing a command.
    CommandStart,
    /// `$` introducing a variable reference.
    VariableStart,
    /// `{` after `$`.
    LBrace,
    /// `}` closing a braced variable.
    RBrace,
    /// `:` separating a command from its value.
    Colon,
    /// Command, agent, or variable name.
    Identifier,
    /// Command value following `:`.
    CommandProp,
    /// Quoted agent name.
    QuotedString,
    /// Opening triple backtick.
    CodeFenceStart,
    /// Language identifier following an opening fence.
    LanguageId,
    /// One verbatim line inside a fence.
    CodeContent,
    /// Closing triple backtick line.
    CodeFenceEnd,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Returns `true` for the three trigger tokens that start a `Used`/variable node.
    #[must_use]
    pub const fn is_trigger(self) -> bool {
        matches!(
            self,
            Self::AgentStart | Self::CommandStart | Self::VariableStart
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Text => "text",
            Self::Newline => "newline",
            Self::AgentStart => "`@`",
            Self::CommandStart => "`/`",
            Self::VariableStart => "`$`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::Colon => "`:`",
            Self::Identifier => "identifier",
            Self::CommandProp => "command value",
            Self::QuotedString => "quoted string",
            Self::CodeFenceStart => "code fence",
            Self::LanguageId => "language id",
            Self::CodeContent => "code",
            Self::CodeFenceEnd => "closing code fence",
            Self::Eof => "end of input",
        };
        f.write_str(label)
    }
}

/// Source location span. `start`/`end` are byte offsets; `line`/`column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl Default for Span {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        }
    }
}

/// A token with its kind, original text, and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Exact source text.
    pub text: String,
    /// Source location.
    pub span: Span,
}

impl Token {
    /// Returns `true` for the end-of-input token.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}
