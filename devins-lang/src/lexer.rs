//! Mode-switching lexer for DevIns source text.
//!
//! The lexer never fails. Trigger characters that do not form a valid
//! construct fall back to plain text, and an unterminated fence simply runs to
//! the end of input.

use crate::token::{Span, Token, TokenKind};

const FENCE: &str = "```";

/// Lexer over a borrowed source string.
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    in_fence: bool,
    tokens: Vec<Token>,
}

/// Start of a token being scanned.
#[derive(Clone, Copy)]
struct Mark {
    start: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer positioned at the start of `source`.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            in_fence: false,
            tokens: Vec::new(),
        }
    }

    /// Scans the whole input. The returned vector always ends with [`TokenKind::Eof`].
    #[must_use]
    pub fn tokenize(mut self) -> Vec<Token> {
        while !self.is_at_end() {
            if self.in_fence {
                self.lex_fence_content();
            } else {
                self.lex_default();
            }
        }

        let eof = self.mark();
        self.emit(TokenKind::Eof, eof);
        self.tokens
    }

    fn lex_default(&mut self) {
        if self.peek() == Some('\n') {
            let mark = self.mark();
            self.advance();
            self.emit(TokenKind::Newline, mark);
            return;
        }

        if self.rest().starts_with(FENCE) {
            self.lex_fence_open();
            return;
        }

        match self.trigger_here() {
            Some('@') => self.lex_agent(),
            Some('/') => self.lex_command(),
            Some('$') => self.lex_variable(),
            _ => self.lex_text(),
        }
    }

    fn lex_text(&mut self) {
        let mark = self.mark();
        self.advance();
        while let Some(c) = self.peek() {
            if c == '\n' || self.rest().starts_with(FENCE) || self.trigger_here().is_some() {
                break;
            }
            self.advance();
        }
        self.emit(TokenKind::Text, mark);
    }

    fn lex_agent(&mut self) {
        let mark = self.mark();
        self.advance();
        self.emit(TokenKind::AgentStart, mark);

        if self.peek() == Some('"') {
            let mark = self.mark();
            self.advance();
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.advance();
                if c == '"' {
                    break;
                }
            }
            self.emit(TokenKind::QuotedString, mark);
        } else {
            self.lex_identifier(is_ident_continue);
        }
    }

    fn lex_command(&mut self) {
        let mark = self.mark();
        self.advance();
        self.emit(TokenKind::CommandStart, mark);

        let mark = self.mark();
        while let Some(c) = self.peek() {
            // A trailing `.` ends a sentence rather than the identifier.
            let continues = is_command_continue(c)
                && (c != '.' || self.peek_nth(1).is_some_and(is_command_continue));
            if !continues {
                break;
            }
            self.advance();
        }
        self.emit(TokenKind::Identifier, mark);

        if self.peek() == Some(':') {
            let mark = self.mark();
            self.advance();
            self.emit(TokenKind::Colon, mark);

            let mark = self.mark();
            while self.peek().is_some_and(|c| !c.is_whitespace()) {
                self.advance();
            }
            if self.pos > mark.start {
                self.emit(TokenKind::CommandProp, mark);
            }
        }
    }

    fn lex_variable(&mut self) {
        let mark = self.mark();
        self.advance();
        self.emit(TokenKind::VariableStart, mark);

        if self.peek() == Some('{') {
            let mark = self.mark();
            self.advance();
            self.emit(TokenKind::LBrace, mark);
            self.lex_identifier(is_ident_continue);
            if self.peek() == Some('}') {
                let mark = self.mark();
                self.advance();
                self.emit(TokenKind::RBrace, mark);
            }
        } else {
            self.lex_identifier(is_ident_continue);
        }
    }

    fn lex_identifier(&mut self, continues: fn(char) -> bool) {
        let mark = self.mark();
        while self.peek().is_some_and(continues) {
            self.advance();
        }
        self.emit(TokenKind::Identifier, mark);
    }

    fn lex_fence_open(&mut self) {
        let mark = self.mark();
        for _ in 0..FENCE.len() {
            self.advance();
        }
        self.emit(TokenKind::CodeFenceStart, mark);
        self.in_fence = true;

        // A fence closed on its own line is inline code and has no language id.
        let line = self.rest().split('\n').next().unwrap_or_default();
        if line.contains(FENCE) {
            return;
        }

        let mark = self.mark();
        while self.peek().is_some_and(|c| c != '\n') {
            self.advance();
        }
        if self.pos > mark.start {
            self.emit(TokenKind::LanguageId, mark);
        }

        if self.peek() == Some('\n') {
            let mark = self.mark();
            self.advance();
            self.emit(TokenKind::Newline, mark);
        }
    }

    /// Scans fenced content up to the next fence, which closes the block
    /// wherever it appears. Text after the closing fence is lexed normally.
    fn lex_fence_content(&mut self) {
        let mark = self.mark();
        let indented_close = self.at_line_start()
            && self
                .rest()
                .trim_start_matches([' ', '\t'])
                .starts_with(FENCE);
        if indented_close || self.rest().starts_with(FENCE) {
            while self.peek().is_some_and(|c| c == ' ' || c == '\t') {
                self.advance();
            }
            for _ in 0..FENCE.len() {
                self.advance();
            }
            self.emit(TokenKind::CodeFenceEnd, mark);
            self.in_fence = false;
            return;
        }

        while let Some(c) = self.advance() {
            if c == '\n' || self.rest().starts_with(FENCE) {
                break;
            }
        }
        self.emit(TokenKind::CodeContent, mark);
    }

    fn at_line_start(&self) -> bool {
        self.source[..self.pos]
            .chars()
            .next_back()
            .is_none_or(|c| c == '\n')
    }

    /// Returns the trigger character at the cursor when it starts a construct.
    fn trigger_here(&self) -> Option<char> {
        if !self.at_word_boundary() {
            return None;
        }

        let trigger = self.peek()?;
        let next = self.peek_nth(1)?;
        let valid = match trigger {
            '@' => is_ident_start(next) || next == '"',
            '/' => is_command_start(next),
            '$' if next == '{' => self.peek_nth(2).is_some_and(is_ident_start),
            '$' => is_ident_start(next),
            _ => false,
        };
        valid.then_some(trigger)
    }

    fn at_word_boundary(&self) -> bool {
        self.source[..self.pos]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn mark(&self) -> Mark {
        Mark {
            start: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    fn emit(&mut self, kind: TokenKind, mark: Mark) {
        self.tokens.push(Token {
            kind,
            text: self.source[mark.start..self.pos].to_string(),
            span: Span {
                start: mark.start,
                end: self.pos,
                line: mark.line,
                column: mark.column,
            },
        });
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_command_start(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

fn is_command_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_command_with_value() {
        let tokens = Lexer::new("/read-file:src/main.rs").tokenize();
        let summary: Vec<_> = tokens.iter().map(|t| (t.kind, t.text.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (TokenKind::CommandStart, "/"),
                (TokenKind::Identifier, "read-file"),
                (TokenKind::Colon, ":"),
                (TokenKind::CommandProp, "src/main.rs"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn command_identifier_drops_sentence_period() {
        let tokens = Lexer::new("run /help.").tokenize();
        assert_eq!(tokens[2].text, "help");
        assert_eq!(tokens[3].kind, TokenKind::Text);
        assert_eq!(tokens[3].text, ".");
    }

    #[test]
    fn triggers_need_word_boundary() {
        assert_eq!(kinds("a/b user@host cost$5"), vec![TokenKind::Text, TokenKind::Eof]);
        assert_eq!(kinds("50 $ total"), vec![TokenKind::Text, TokenKind::Eof]);
    }

    #[test]
    fn lexes_agent_and_variables() {
        assert_eq!(
            kinds("@reviewer ${name} $x"),
            vec![
                TokenKind::AgentStart,
                TokenKind::Identifier,
                TokenKind::Text,
                TokenKind::VariableStart,
                TokenKind::LBrace,
                TokenKind::Identifier,
                TokenKind::RBrace,
                TokenKind::Text,
                TokenKind::VariableStart,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn quoted_agent_name() {
        let tokens = Lexer::new("@\"code reviewer\" go").tokenize();
        assert_eq!(tokens[1].kind, TokenKind::QuotedString);
        assert_eq!(tokens[1].text, "\"code reviewer\"");
    }

    #[test]
    fn fence_content_is_verbatim() {
        let tokens = Lexer::new("```rust\nlet a = $b; // @x /y\n```\nafter").tokenize();
        let summary: Vec<_> = tokens.iter().map(|t| (t.kind, t.text.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (TokenKind::CodeFenceStart, "```"),
                (TokenKind::LanguageId, "rust"),
                (TokenKind::Newline, "\n"),
                (TokenKind::CodeContent, "let a = $b; // @x /y\n"),
                (TokenKind::CodeFenceEnd, "```"),
                (TokenKind::Newline, "\n"),
                (TokenKind::Text, "after"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn inline_fence_closes_on_same_line() {
        let tokens = Lexer::new("Run ```ls -la``` then /help").tokenize();
        let summary: Vec<_> = tokens.iter().map(|t| (t.kind, t.text.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (TokenKind::Text, "Run "),
                (TokenKind::CodeFenceStart, "```"),
                (TokenKind::CodeContent, "ls -la"),
                (TokenKind::CodeFenceEnd, "```"),
                (TokenKind::Text, " then "),
                (TokenKind::CommandStart, "/"),
                (TokenKind::Identifier, "help"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn text_after_closing_fence_is_lexed() {
        let tokens = Lexer::new("```\nx\n  ``` and $name").tokenize();
        let summary: Vec<_> = tokens.iter().map(|t| (t.kind, t.text.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (TokenKind::CodeFenceStart, "```"),
                (TokenKind::Newline, "\n"),
                (TokenKind::CodeContent, "x\n"),
                (TokenKind::CodeFenceEnd, "  ```"),
                (TokenKind::Text, " and "),
                (TokenKind::VariableStart, "$"),
                (TokenKind::Identifier, "name"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = Lexer::new("hi\n  /file:a").tokenize();
        let command = tokens
            .iter()
            .find(|t| t.kind == TokenKind::CommandStart)
            .unwrap();
        assert_eq!((command.span.line, command.span.column), (2, 3));
        assert_eq!(command.span.start, 5);
    }

    #[test]
    fn handles_multibyte_text() {
        let tokens = Lexer::new("héllo wörld $naïve").tokenize();
        let rebuilt: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(rebuilt, "héllo wörld $naïve");
    }
}
