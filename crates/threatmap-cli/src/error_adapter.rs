//! miette rendering for threatmap errors and validation warnings.
//!
//! Every diagnostic in a parse error is reported on its own, with a snippet
//! of the YAML source. Other errors become a single coded report.

use std::fmt;

use miette::{
    Diagnostic as MietteDiagnostic, GraphicalReportHandler, LabeledSpan, Severity as MietteSeverity,
    SourceSpan,
};

use threatmap::ThreatmapError;
use threatmap_yaml::{
    Span,
    error::{Diagnostic, Severity},
};

/// Adapter for a single threatmap diagnostic.
#[derive(Debug)]
pub struct DiagnosticAdapter<'a> {
    diag: &'a Diagnostic,
    /// Source text for displaying snippets
    src: &'a str,
}

impl<'a> DiagnosticAdapter<'a> {
    pub fn new(diag: &'a Diagnostic, src: &'a str) -> Self {
        Self { diag, src }
    }
}

impl fmt::Display for DiagnosticAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diag.message())
    }
}

impl std::error::Error for DiagnosticAdapter<'_> {}

impl MietteDiagnostic for DiagnosticAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diag
            .code()
            .map(|c| Box::new(c) as Box<dyn fmt::Display>)
    }

    fn severity(&self) -> Option<MietteSeverity> {
        Some(match self.diag.severity() {
            Severity::Error => MietteSeverity::Error,
            Severity::Warning => MietteSeverity::Warning,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diag
            .help()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = self.diag.labels();
        if labels.is_empty() {
            return None;
        }

        Some(Box::new(labels.iter().map(|label| {
            let span = span_to_miette(label.span());
            let message = Some(label.message().to_string());
            if label.is_primary() {
                LabeledSpan::new_primary_with_span(message, span)
            } else {
                LabeledSpan::new_with_span(message, span)
            }
        })))
    }
}

/// Adapter for non-diagnostic [`ThreatmapError`] variants.
#[derive(Debug)]
pub struct ErrorAdapter<'a>(pub &'a ThreatmapError);

impl fmt::Display for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorAdapter<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl MietteDiagnostic for ErrorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.0 {
            ThreatmapError::Io(_) => "threatmap::io",
            ThreatmapError::Parse { .. } => return None,
            ThreatmapError::Codec(_) => "threatmap::share",
            ThreatmapError::Config(_) => "threatmap::config",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match &self.0 {
            ThreatmapError::Codec(_) => Some(Box::new(
                "share links must be copied whole, including the `model=` parameter",
            )),
            _ => None,
        }
    }
}

fn span_to_miette(span: Span) -> SourceSpan {
    SourceSpan::new(span.start().into(), span.len())
}

/// Render `err` for the terminal, one string per report.
///
/// A [`ThreatmapError::Parse`] yields one report per diagnostic; every other
/// variant yields exactly one.
pub fn render_error(err: &ThreatmapError) -> Vec<String> {
    match err {
        ThreatmapError::Parse { err: parse_err, src } => {
            render_diagnostics(parse_err.diagnostics(), src)
        }
        _ => vec![render(&ErrorAdapter(err))],
    }
}

/// Render diagnostics against `src`, one string per diagnostic.
pub fn render_diagnostics(diagnostics: &[Diagnostic], src: &str) -> Vec<String> {
    diagnostics
        .iter()
        .map(|diag| render(&DiagnosticAdapter::new(diag, src)))
        .collect()
}

fn render(report: &dyn MietteDiagnostic) -> String {
    let mut writer = String::new();
    if GraphicalReportHandler::new()
        .render_report(&mut writer, report)
        .is_err()
    {
        writer = report.to_string();
    }
    writer
}
