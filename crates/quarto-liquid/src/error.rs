/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing, rendering and compilation.
//!
//! Parse problems never surface as `Err` from the parser itself; they are
//! collected as [`Diagnostic`]s and only wrapped into [`ParseErrors`] when a
//! caller asks for a `Result`. Render problems abort the current render and
//! unwind through [`RenderError`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticKind};

/// Errors that abort a render.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The configured step budget was exhausted.
    #[error("Step budget exceeded: the template performed more than {max_steps} steps")]
    StepBudgetExceeded { max_steps: u64 },

    /// Nested include/render tags went deeper than allowed.
    #[error("Recursion limit exceeded (depth > {max_depth}) while rendering '{template}'")]
    RecursionLimitExceeded { template: String, max_depth: usize },

    /// The render was cancelled through its cancellation token.
    #[error("Render cancelled")]
    Cancelled,

    /// A range used as a value has too many elements to materialize.
    #[error("Range of {length} elements is too large to use as a value (at most {max_length})")]
    RangeTooLarge { length: usize, max_length: usize },

    /// A context-dependent tag ran without the ambient value it needs.
    #[error("Tag '{tag}' requires the ambient value '{key}', which is not set")]
    MissingAmbientValue { tag: String, key: String },

    /// A variable was read in strict mode without being defined.
    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },

    /// A filter name is not registered (strict filters only).
    #[error("Unknown filter: {name}")]
    UnknownFilter { name: String },

    /// A filter was called with missing or ill-typed arguments.
    #[error("Invalid arguments for filter '{filter}': {message}")]
    InvalidFilterArgs { filter: String, message: String },

    /// The member access strategy refused a member lookup.
    #[error("Member '{member}' is not accessible on type '{type_name}'")]
    MemberAccess { type_name: String, member: String },

    /// An included template does not exist.
    #[error("Template not found: {path}")]
    TemplateNotFound { path: String },

    /// An included template failed to parse.
    #[error("Failed to parse included template '{path}': {message}")]
    PartialParse { path: String, message: String },

    /// A partial reached from compiled code has no compiled form.
    #[error("Failed to compile included template '{path}': {source}")]
    PartialCompile {
        path: String,
        #[source]
        source: CompileError,
    },

    /// The host file provider failed.
    #[error("File provider error: {0}")]
    FileProvider(#[from] FileProviderError),

    /// Error raised by a custom tag or host callback.
    #[error("{message}")]
    Custom { message: String },

    /// Writing to the output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Filter argument contract violation.
    pub fn invalid_filter_args(filter: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::InvalidFilterArgs {
            filter: filter.into(),
            message: message.into(),
        }
    }

    /// Error with a free-form message, for extension tags and callbacks.
    pub fn custom(message: impl Into<String>) -> Self {
        RenderError::Custom {
            message: message.into(),
        }
    }
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors reported by a [`crate::FileProvider`].
#[derive(Debug, Error)]
pub enum FileProviderError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("path '{0}' escapes the provider root")]
    OutsideRoot(String),
}

/// The diagnostics of a failed parse, together with the source they refer to.
#[derive(Debug, Clone)]
pub struct ParseErrors {
    pub diagnostics: Vec<Diagnostic>,
    pub source_name: String,
    source: Arc<str>,
}

impl ParseErrors {
    pub fn new(diagnostics: Vec<Diagnostic>, source_name: impl Into<String>, source: Arc<str>) -> Self {
        Self {
            diagnostics,
            source_name: source_name.into(),
            source,
        }
    }

    /// Only the error-level diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Error)
    }

    /// Render every diagnostic as an annotated source snippet.
    pub fn render(&self) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.to_report(&self.source_name, &self.source))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .errors()
            .map(|d| format!("{}:{}", self.source_name, d))
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl std::error::Error for ParseErrors {}

/// Errors from the closure compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The source did not parse.
    #[error("{0}")]
    Parse(#[from] ParseErrors),

    /// A node has no compiled form.
    #[error("Cannot compile {node_type} at {line}:{column}: node is not sourceable")]
    UnsourceableNode {
        node_type: String,
        line: usize,
        column: usize,
    },
}
