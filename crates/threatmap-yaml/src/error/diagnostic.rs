//! The core diagnostic type.
//!
//! A [`Diagnostic`] represents a single error or warning with an optional
//! error code, labelled source spans, and help text.

use std::fmt;

use crate::{
    error::{ErrorCode, Label, Severity},
    span::Span,
};

/// A diagnostic message with source location information.
///
/// ```text
/// warning[E200]: threat `T01` references unknown data flow `api->cache`
///   --> model.yaml:41:9
///    |
/// 41 |       - api->cache
///    |         ^^^^^^^^^^ not defined in `data_flows`
///    |
///    = help: remove the entry or add the missing data flow
/// ```
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: Severity,
    code: Option<ErrorCode>,
    message: String,
    labels: Vec<Label>,
    help: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Get the severity of this diagnostic.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Get the error code, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    /// Get the primary message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get all labels attached to this diagnostic.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Get the help text, if any.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Set the error code.
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Add a primary label to this diagnostic.
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    /// Add a secondary label to this diagnostic.
    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    /// Set the help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            help: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "error[E001]: message" or "error: message"
        write!(f, "{}", self.severity)?;
        if let Some(code) = self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_builder_chain() {
        let diag = Diagnostic::warning("ref `db` is defined multiple times")
            .with_code(ErrorCode::E201)
            .with_label(Span::new(100..120), "duplicate ref")
            .with_secondary_label(Span::new(50..70), "first defined here")
            .with_help("rename one of them");

        assert!(diag.severity().is_warning());
        assert_eq!(diag.code(), Some(ErrorCode::E201));
        assert_eq!(diag.labels().len(), 2);
        assert!(diag.labels()[0].is_primary());
        assert!(diag.labels()[1].is_secondary());
        assert_eq!(diag.help(), Some("rename one of them"));
    }

    #[test]
    fn test_diagnostic_display_with_code() {
        let diag = Diagnostic::error("missing field `name`").with_code(ErrorCode::E100);
        assert_eq!(diag.to_string(), "error[E100]: missing field `name`");
    }

    #[test]
    fn test_diagnostic_display_without_code() {
        let diag = Diagnostic::warning("odd indentation");
        assert_eq!(diag.to_string(), "warning: odd indentation");
    }
}
