//! Syntax tree produced by the parser.
//!
//! Every node keeps the exact source text it was parsed from, so a document
//! (or any single node) can be re-rendered with [`Node::to_source`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::Span;

/// Whether a `Used` node is a command or an agent mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsedKind {
    /// `/command[:value]`
    Command,
    /// `@agent`
    Agent,
}

impl fmt::Display for UsedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => f.write_str("command"),
            Self::Agent => f.write_str("agent"),
        }
    }
}

/// A command invocation or agent mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedNode {
    /// Command or agent.
    pub kind: UsedKind,
    /// Command or agent name, unquoted.
    pub identifier: String,
    /// Value after `:`. `None` when no colon was written.
    pub raw_args: Option<String>,
    /// Body attached to a command: the line break and code block that follow it.
    pub children: Vec<Node>,
    /// Location of the trigger character.
    pub span: Span,
    raw: String,
}

impl UsedNode {
    /// Returns the code block attached to this command, if any.
    #[must_use]
    pub fn body(&self) -> Option<&CodeBlockNode> {
        self.children.iter().find_map(|child| match child {
            Node::CodeBlock(block) => Some(block),
            _ => None,
        })
    }

    /// Returns the command text without its attached body.
    #[must_use]
    pub fn head_source(&self) -> &str {
        &self.raw
    }
}

/// A `$name` or `${name}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableNode {
    /// Variable name.
    pub name: String,
    /// Whether the `${...}` form was used.
    pub braced: bool,
    /// Location of the `$`.
    pub span: Span,
    raw: String,
}

/// A fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockNode {
    /// Language tag following the opening fence.
    pub language_id: Option<String>,
    /// Verbatim content between the fences.
    pub content: String,
    /// `false` when input ended before a closing fence.
    pub terminated: bool,
    /// Location of the opening fence.
    pub span: Span,
    raw: String,
}

/// A syntax tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Plain prose, including line breaks.
    Text(String),
    /// Command or agent mention.
    Used(UsedNode),
    /// Variable reference.
    Variable(VariableNode),
    /// Fenced code block.
    CodeBlock(CodeBlockNode),
}

impl Node {
    /// Re-renders the node as the exact text it was parsed from.
    #[must_use]
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write_source(&mut out);
        out
    }

    fn write_source(&self, out: &mut String) {
        match self {
            Self::Text(text) => out.push_str(text),
            Self::Used(used) => {
                out.push_str(&used.raw);
                for child in &used.children {
                    child.write_source(out);
                }
            }
            Self::Variable(var) => out.push_str(&var.raw),
            Self::CodeBlock(block) => out.push_str(&block.raw),
        }
    }

    /// Returns the direct children of this node.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        match self {
            Self::Used(used) => &used.children,
            _ => &[],
        }
    }

    fn walk_into<'a>(&'a self, out: &mut Vec<&'a Node>) {
        out.push(self);
        for child in self.children() {
            child.walk_into(out);
        }
    }
}

/// Root of a parsed source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    children: Vec<Node>,
}

impl Document {
    pub(crate) fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// Returns the top-level nodes in source order.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Returns every node in depth-first pre-order.
    #[must_use]
    pub fn walk(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        for child in &self.children {
            child.walk_into(&mut out);
        }
        out
    }

    /// Re-renders the whole document.
    #[must_use]
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_source(&mut out);
        }
        out
    }
}

pub(crate) fn used_node(
    kind: UsedKind,
    identifier: String,
    raw_args: Option<String>,
    children: Vec<Node>,
    span: Span,
    raw: String,
) -> UsedNode {
    UsedNode {
        kind,
        identifier,
        raw_args,
        children,
        span,
        raw,
    }
}

pub(crate) fn variable_node(name: String, braced: bool, span: Span, raw: String) -> VariableNode {
    VariableNode {
        name,
        braced,
        span,
        raw,
    }
}

pub(crate) fn code_block_node(
    language_id: Option<String>,
    content: String,
    terminated: bool,
    span: Span,
    raw: String,
) -> CodeBlockNode {
    CodeBlockNode {
        language_id,
        content,
        terminated,
        span,
        raw,
    }
}
