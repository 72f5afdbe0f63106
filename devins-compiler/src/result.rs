//! Compile outcome types.

use devins_lang::{Diagnostic, Severity, Span};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// Marker prefix written in place of a node whose tool failed.
pub const ERROR_MARKER: &str = "<DevInsError>";

/// Per-kind node counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStatistics {
    /// `/command` nodes processed.
    pub command_count: usize,
    /// `$variable` nodes processed.
    pub variable_count: usize,
    /// `@agent` nodes processed.
    pub agent_count: usize,
    /// Syntax nodes visited, including command bodies.
    pub node_count: usize,
}

/// Outcome of one compile. Produced once and never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    output_text: String,
    statistics: CompileStatistics,
    is_local_command: bool,
    has_error: bool,
    error_message: Option<String>,
    diagnostics: Vec<Diagnostic>,
    cancelled: bool,
    execute_agent: Option<String>,
}

impl CompileResult {
    /// Builds the result of a compile that could not start.
    #[must_use]
    pub fn failure(error: &CompileError) -> Self {
        let message = error.to_string();
        Self {
            has_error: true,
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                message: message.clone(),
                line: 1,
                column: 1,
            }],
            error_message: Some(message),
            ..Self::default()
        }
    }

    /// Returns the compiled text.
    #[must_use]
    pub fn output_text(&self) -> &str {
        &self.output_text
    }

    /// Returns the node counts.
    #[must_use]
    pub fn statistics(&self) -> CompileStatistics {
        self.statistics
    }

    /// Returns `true` when a built-in tool ran.
    #[must_use]
    pub fn is_local_command(&self) -> bool {
        self.is_local_command
    }

    /// Returns `true` when any tool failed or the compile could not start.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Returns the first error message.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns parse, policy and execution diagnostics in the order they arose.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Returns `true` when the walk stopped early because of cancellation.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns the first agent mentioned when no agent runner handled it.
    #[must_use]
    pub fn execute_agent(&self) -> Option<&str> {
        self.execute_agent.as_deref()
    }
}

/// Mutable accumulator used while walking a document.
#[derive(Debug, Default)]
pub(crate) struct CompileState {
    output: String,
    pub(crate) statistics: CompileStatistics,
    is_local_command: bool,
    error_message: Option<String>,
    diagnostics: Vec<Diagnostic>,
    cancelled: bool,
    execute_agent: Option<String>,
}

impl CompileState {
    pub(crate) fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            ..Self::default()
        }
    }

    pub(crate) fn push(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub(crate) fn visit(&mut self, nodes: usize) {
        self.statistics.node_count += nodes;
    }

    pub(crate) fn mark_local(&mut self) {
        self.is_local_command = true;
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn request_agent(&mut self, agent: &str) {
        self.execute_agent.get_or_insert_with(|| agent.to_owned());
    }

    pub(crate) fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            line: span.line,
            column: span.column,
        });
    }

    /// Records a failed node and writes the error marker in its place.
    pub(crate) fn error(&mut self, span: Span, message: impl Into<String>) {
        let message = message.into();
        self.output.push_str(ERROR_MARKER);
        self.output.push_str(": ");
        self.output.push_str(&message);
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            message: message.clone(),
            line: span.line,
            column: span.column,
        });
        self.error_message.get_or_insert(message);
    }

    pub(crate) fn finish(self) -> CompileResult {
        CompileResult {
            output_text: self.output,
            statistics: self.statistics,
            is_local_command: self.is_local_command,
            has_error: self.error_message.is_some(),
            error_message: self.error_message,
            diagnostics: self.diagnostics,
            cancelled: self.cancelled,
            execute_agent: self.execute_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_wins() {
        let mut state = CompileState::new(Vec::new());
        state.push("a ");
        state.error(Span::default(), "first");
        state.push(" b ");
        state.error(Span::default(), "second");
        let result = state.finish();

        assert!(result.has_error());
        assert_eq!(result.error_message(), Some("first"));
        assert_eq!(
            result.output_text(),
            "a <DevInsError>: first b <DevInsError>: second"
        );
        assert_eq!(result.diagnostics().len(), 2);
    }

    #[test]
    fn warnings_do_not_flag_errors() {
        let mut state = CompileState::new(Vec::new());
        state.warning(Span::default(), "unknown command");
        state.request_agent("coder");
        state.request_agent("reviewer");
        let result = state.finish();

        assert!(!result.has_error());
        assert_eq!(result.execute_agent(), Some("coder"));
        assert_eq!(result.diagnostics()[0].severity, Severity::Warning);
    }

    #[test]
    fn failure_carries_message() {
        let result = CompileResult::failure(&CompileError::MissingWorkspace);
        assert!(result.has_error());
        assert!(result.output_text().is_empty());
        assert!(result.error_message().unwrap().contains("workspace"));
    }
}
