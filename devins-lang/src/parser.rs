//! Fault-tolerant recursive-descent parser.
//!
//! Parsing never aborts: malformed constructs produce a partial node and a
//! [`Diagnostic`], and the parser carries on with the next token.

use tracing::debug;

use crate::ast::{
    CodeBlockNode, Document, Node, UsedKind, code_block_node, used_node, variable_node,
};
use crate::diagnostic::{Diagnostic, ParseError};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Result of parsing a source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    /// Parsed document.
    pub document: Document,
    /// Problems recovered from while parsing.
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutput {
    /// Returns `true` when no diagnostics were recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Parses DevIns source text.
#[must_use]
pub fn parse(source: &str) -> ParseOutput {
    let tokens = Lexer::new(source).tokenize();
    let output = Parser::new(tokens).parse_document();
    debug!(
        nodes = output.document.children().len(),
        diagnostics = output.diagnostics.len(),
        "parsed document"
    );
    output
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    fn parse_document(mut self) -> ParseOutput {
        let mut children: Vec<Node> = Vec::new();
        while !self.check(TokenKind::Eof) {
            let node = self.parse_node();
            push_merged(&mut children, node);
        }
        ParseOutput {
            document: Document::new(children),
            diagnostics: self.diagnostics,
        }
    }

    fn parse_node(&mut self) -> Node {
        match self.peek_kind() {
            TokenKind::CommandStart => self.parse_used(UsedKind::Command),
            TokenKind::AgentStart => self.parse_used(UsedKind::Agent),
            TokenKind::VariableStart => self.parse_variable(),
            TokenKind::CodeFenceStart => Node::CodeBlock(self.parse_code_block()),
            _ => Node::Text(self.advance().text),
        }
    }

    fn parse_used(&mut self, kind: UsedKind) -> Node {
        let trigger = self.advance();
        let span = trigger.span;
        let mut raw = trigger.text;

        let identifier = match self.peek_kind() {
            TokenKind::Identifier => {
                let token = self.advance();
                raw.push_str(&token.text);
                token.text
            }
            TokenKind::QuotedString => {
                let token = self.advance();
                raw.push_str(&token.text);
                let inner = token.text.trim_start_matches('"');
                match inner.strip_suffix('"') {
                    Some(name) => name.to_string(),
                    None => {
                        self.report(
                            &ParseError::UnterminatedQuote {
                                name: inner.to_string(),
                            },
                            &token,
                        );
                        inner.to_string()
                    }
                }
            }
            _ => String::new(),
        };

        let mut raw_args = None;
        if kind == UsedKind::Command && self.check(TokenKind::Colon) {
            let colon = self.advance();
            raw.push_str(&colon.text);
            if self.check(TokenKind::CommandProp) {
                let value = self.advance();
                raw.push_str(&value.text);
                raw_args = Some(value.text);
            } else {
                self.report(
                    &ParseError::EmptyCommandValue {
                        command: identifier.clone(),
                    },
                    &colon,
                );
                raw_args = Some(String::new());
            }
        }

        let mut children = Vec::new();
        if kind == UsedKind::Command
            && self.check(TokenKind::Newline)
            && self.peek_kind_at(1) == TokenKind::CodeFenceStart
        {
            children.push(Node::Text(self.advance().text));
            children.push(Node::CodeBlock(self.parse_code_block()));
        }

        Node::Used(used_node(kind, identifier, raw_args, children, span, raw))
    }

    fn parse_variable(&mut self) -> Node {
        let trigger = self.advance();
        let span = trigger.span;
        let mut raw = trigger.text;

        let braced = self.check(TokenKind::LBrace);
        if braced {
            raw.push_str(&self.advance().text);
        }

        let mut name = String::new();
        if self.check(TokenKind::Identifier) {
            let token = self.advance();
            raw.push_str(&token.text);
            name = token.text;
        }

        if braced {
            if self.check(TokenKind::RBrace) {
                raw.push_str(&self.advance().text);
            } else {
                let at = self.peek().clone();
                self.report(&ParseError::UnterminatedVariable { name: name.clone() }, &at);
            }
        }

        Node::Variable(variable_node(name, braced, span, raw))
    }

    fn parse_code_block(&mut self) -> CodeBlockNode {
        let open = self.advance();
        let span = open.span;
        let mut raw = open.text.clone();

        let mut language_id = None;
        if self.check(TokenKind::LanguageId) {
            let token = self.advance();
            raw.push_str(&token.text);
            language_id = token.text.split_whitespace().next().map(str::to_string);
        }
        if self.check(TokenKind::Newline) {
            raw.push_str(&self.advance().text);
        }

        let mut content = String::new();
        while self.check(TokenKind::CodeContent) {
            let token = self.advance();
            content.push_str(&token.text);
            raw.push_str(&token.text);
        }

        let terminated = self.check(TokenKind::CodeFenceEnd);
        if terminated {
            raw.push_str(&self.advance().text);
        } else {
            self.report(&ParseError::UnterminatedFence, &open);
        }

        code_block_node(language_id, content, terminated, span, raw)
    }

    fn report(&mut self, error: &ParseError, at: &Token) {
        debug!(line = at.span.line, column = at.span.column, %error, "parse diagnostic");
        self.diagnostics.push(Diagnostic::error(error, at.span));
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is_eof() {
            self.pos += 1;
        }
        token
    }
}

/// Appends a node, merging adjacent text runs.
fn push_merged(children: &mut Vec<Node>, node: Node) {
    if let Node::Text(text) = &node {
        if let Some(Node::Text(previous)) = children.last_mut() {
            previous.push_str(text);
            return;
        }
    }
    children.push(node);
}
