//! Source-snippet diagnostic rendering, shared by the compiler and the CLI.
//!
//! A phase error converts to a `Diagnostic`; `render` turns that plus the
//! source text into a source-snippet report with a caret under the
//! offending span.

use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};

use lumen_syntax::{LexError, ParseError, Span};

use crate::compiler::CompileError;
use crate::vm::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub help: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self { severity: Severity::Error, message: message.into(), span, help: Vec::new() }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    /// Builds a diagnostic from a 1-indexed source line when only a line
    /// number (not a byte span) is available, as with `CompileError` and
    /// `RuntimeError`.
    pub fn from_line(message: impl Into<String>, line: u32, source: &str) -> Self {
        Self::error(message, line_span(source, line))
    }

    pub fn from_compile_error(err: &CompileError, source: &str) -> Self {
        Self::from_line(err.to_string(), err.line(), source)
    }

    pub fn from_runtime_error(err: &RuntimeError, source: &str) -> Self {
        match err.line() {
            Some(line) => Self::from_line(err.to_string(), line, source),
            None => Self::error(err.to_string(), Span::new(0, source.len().max(1))),
        }
    }
}

fn line_span(source: &str, line: u32) -> Span {
    let mut start = 0;
    for (idx, text) in source.split('\n').enumerate() {
        if idx as u32 + 1 == line {
            let end = start + text.len();
            return Span::new(start, end.max(start + 1));
        }
        start += text.len() + 1;
    }
    Span::new(source.len(), source.len() + 1)
}

impl From<&LexError> for Diagnostic {
    fn from(err: &LexError) -> Self {
        Self::error(err.to_string(), err.span())
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(err: &ParseError) -> Self {
        Self::error(err.to_string(), err.span())
    }
}

/// Render `diagnostic` against `source` to stderr with ANSI colors.
pub fn render(source_name: &str, source: &str, diagnostic: &Diagnostic) {
    render_to_writer(source_name, source, diagnostic, &mut std::io::stderr(), true).ok();
}

/// Render without color, for snapshotting in tests.
pub fn render_to_string(source_name: &str, source: &str, diagnostic: &Diagnostic) -> String {
    let mut buf = Vec::new();
    render_to_writer(source_name, source, diagnostic, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).into_owned()
}

fn render_to_writer(
    source_name: &str,
    source: &str,
    diagnostic: &Diagnostic,
    writer: &mut dyn std::io::Write,
    use_color: bool,
) -> std::io::Result<()> {
    let mut colors = ColorGenerator::new();
    let kind = match diagnostic.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
    };
    let range = diagnostic.span.start..diagnostic.span.end.max(diagnostic.span.start + 1);
    let mut report = Report::build(kind, (source_name, range.clone()))
        .with_message(&diagnostic.message)
        .with_config(ariadne::Config::default().with_color(use_color));

    report = report.with_label(
        Label::new((source_name, range))
            .with_message(&diagnostic.message)
            .with_color(colors.next()),
    );

    for help in &diagnostic.help {
        report = report.with_help(help);
    }

    report
        .finish()
        .write((source_name, Source::from(source)), &mut *writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_without_panicking() {
        let source = "print 1 + \"x\"";
        let diag = Diagnostic::error("operands must be two numbers or two strings", Span::new(10, 13));
        let rendered = render_to_string("<script>", source, &diag);
        assert!(rendered.contains("operands must be two numbers"));
    }
}
