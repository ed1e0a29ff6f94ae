/*
 * diagnostics.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parse diagnostics with line/column locations.
//!
//! The parser never stops at the first problem. Each independent error is
//! pushed into a [`DiagnosticCollector`] and parsing resumes after the
//! offending delimiter, so a single pass can report several mistakes.
//!
//! Error codes:
//!
//! | code    | meaning                              |
//! |---------|--------------------------------------|
//! | `L-1-1` | unterminated `{{` / `{%` delimiter   |
//! | `L-1-2` | unknown tag                          |
//! | `L-1-3` | tag outside of its enclosing block   |
//! | `L-1-4` | block tag never closed               |
//! | `L-1-5` | invalid expression or tag arguments  |

use std::fmt;

use crate::ast::Span;

pub const UNTERMINATED_DELIMITER: &str = "L-1-1";
pub const UNKNOWN_TAG: &str = "L-1-2";
pub const UNEXPECTED_TAG: &str = "L-1-3";
pub const UNCLOSED_BLOCK: &str = "L-1-4";
pub const INVALID_SYNTAX: &str = "L-1-5";

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

/// A single parse diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub code: Option<String>,
    pub message: String,
    pub span: Span,
    /// 1-based line of `span.start`.
    pub line: usize,
    /// 1-based column (in characters) of `span.start`.
    pub column: usize,
}

impl Diagnostic {
    /// Render this diagnostic as an annotated source snippet.
    pub fn to_report(&self, source_name: &str, source: &str) -> String {
        use ariadne::{Config, Label, Report, ReportKind, Source};

        // ariadne counts characters, spans are byte offsets
        let start = char_offset(source, self.span.start);
        let end = char_offset(source, self.span.end).max(start);

        let report_kind = match self.kind {
            DiagnosticKind::Error => ReportKind::Error,
            DiagnosticKind::Warning => ReportKind::Warning,
        };
        let title = match &self.code {
            Some(code) => format!("[{}] {}", code, self.message),
            None => self.message.clone(),
        };

        let report = Report::build(report_kind, source_name.to_string(), start)
            .with_config(Config::default().with_color(false))
            .with_message(title)
            .with_label(Label::new((source_name.to_string(), start..end)).with_message(&self.message))
            .finish();

        let mut output = Vec::new();
        match report.write((source_name.to_string(), Source::from(source)), &mut output) {
            Ok(()) => String::from_utf8_lossy(&output).into_owned(),
            Err(_) => format!("{}:{}", source_name, self),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}:{}: [{}] {}", self.line, self.column, code, self.message),
            None => write!(f, "{}:{}: {}", self.line, self.column, self.message),
        }
    }
}

fn char_offset(source: &str, byte_offset: usize) -> usize {
    let clamped = byte_offset.min(source.len());
    source
        .char_indices()
        .take_while(|(i, _)| *i < clamped)
        .count()
}

/// Maps byte offsets to 1-based line/column pairs.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(memchr::memchr_iter(b'\n', source.as_bytes()).map(|i| i + 1));
        Self { line_starts }
    }

    /// 1-based `(line, column)` of a byte offset; columns count characters.
    pub fn location(&self, source: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = source
            .get(line_start..offset)
            .map_or(0, |text| text.chars().count());
        (line + 1, column + 1)
    }
}

/// Collector for diagnostics produced while parsing one source text.
#[derive(Debug)]
pub struct DiagnosticCollector<'s> {
    source: &'s str,
    lines: LineIndex,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> DiagnosticCollector<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
            diagnostics: Vec::new(),
        }
    }

    fn push(&mut self, kind: DiagnosticKind, code: &str, message: impl Into<String>, span: Span) {
        let (line, column) = self.lines.location(self.source, span.start);
        self.diagnostics.push(Diagnostic {
            kind,
            code: Some(code.to_string()),
            message: message.into(),
            span,
            line,
            column,
        });
    }

    /// Add an error with error code and source location.
    pub fn error_with_code(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.push(DiagnosticKind::Error, code, message, span);
    }

    /// Add a warning with error code and source location.
    pub fn warn_with_code(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.push(DiagnosticKind::Warning, code, message, span);
    }

    /// Check if any errors were collected (warnings don't count).
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Consume the collector and return the diagnostics, sorted by source location.
    pub fn into_diagnostics(mut self) -> Vec<Diagnostic> {
        self.diagnostics.sort_by_key(|d| d.span.start);
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_locations() {
        let source = "ab\ncdé\nf";
        let index = LineIndex::new(source);
        assert_eq!(index.location(source, 0), (1, 1));
        assert_eq!(index.location(source, 1), (1, 2));
        assert_eq!(index.location(source, 3), (2, 1));
        // 'é' is two bytes; 'f' starts line 3
        assert_eq!(index.location(source, source.len() - 1), (3, 1));
    }

    #[test]
    fn test_collector_sorts_and_counts() {
        let source = "{{ a }}\n{% b %}";
        let mut collector = DiagnosticCollector::new(source);
        collector.warn_with_code(UNKNOWN_TAG, "later", Span::new(8, 15));
        assert!(!collector.has_errors());
        collector.error_with_code(INVALID_SYNTAX, "earlier", Span::new(0, 7));
        assert!(collector.has_errors());

        let diagnostics = collector.into_diagnostics();
        assert_eq!(diagnostics[0].message, "earlier");
        assert_eq!(diagnostics[1].line, 2);
        assert_eq!(diagnostics[1].column, 1);
    }

    #[test]
    fn test_report_mentions_code_and_message() {
        let source = "Hello {% bogus %}";
        let mut collector = DiagnosticCollector::new(source);
        collector.error_with_code(UNKNOWN_TAG, "Unknown tag 'bogus'", Span::new(6, 17));
        let diagnostic = &collector.diagnostics()[0];
        let report = diagnostic.to_report("page.liquid", source);
        assert!(report.contains("[L-1-2] Unknown tag 'bogus'"));
        assert!(report.contains("page.liquid"));
    }

    #[test]
    fn test_display_includes_location() {
        let source = "x\n  {% y %}";
        let mut collector = DiagnosticCollector::new(source);
        collector.error_with_code(UNKNOWN_TAG, "Unknown tag 'y'", Span::new(4, 11));
        assert_eq!(
            collector.diagnostics()[0].to_string(),
            "2:3: [L-1-2] Unknown tag 'y'"
        );
    }
}
