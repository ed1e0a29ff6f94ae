/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Liquid template engine for Quarto.
//!
//! This crate parses, interprets and compiles templates written in a
//! Liquid-compatible syntax:
//!
//! - Output: `{{ page.title | upcase }}`, with whitespace control `{{- x -}}`
//! - Tags: `assign`, `capture`, `if`/`elsif`/`else`, `unless`, `case`/`when`,
//!   `for` (with `limit`, `offset`, `reversed`, `else`), `break`, `continue`,
//!   `cycle`, `increment`, `decrement`, `raw`, `comment`, `echo`
//! - Partials: `include` (shared scope) and `render` (isolated scope)
//! - Layouts: `{% renderbody %}`
//! - Host-registered tags and filters
//!
//! # Architecture
//!
//! Parsing never fails outright. The parser collects [`Diagnostic`]s with
//! source positions and recovers at the next tag, so one pass reports every
//! independent error. A parsed [`Template`] is an immutable tree of
//! reference-counted nodes which can be rendered by the tree-walking
//! interpreter or lowered once by the closure compiler into a
//! [`CompiledTemplate`]. Both produce identical output.
//!
//! All per-render state (variables, counters, step budget, ambient values)
//! lives in a [`TemplateContext`]; a template can be rendered concurrently
//! with one context per render.
//!
//! # Example
//!
//! ```
//! use quarto_liquid::TemplateContext;
//!
//! let template = quarto_liquid::parse("Hello, {{ name | capitalize }}!").unwrap();
//! let mut ctx = TemplateContext::new();
//! ctx.set_value("name", "world");
//! assert_eq!(template.render(&mut ctx).unwrap(), "Hello, World!");
//! ```

pub mod ast;
pub mod compiler;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod file_provider;
pub mod filters;
pub mod member_access;
pub mod options;
pub mod output;
pub mod parser;
pub mod tags;
pub mod template;
pub mod value;

// Re-export main types at crate root
pub use compiler::CompiledTemplate;
pub use context::{ScopeKind, TemplateContext};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{CompileError, FileProviderError, ParseErrors, RenderError, RenderResult};
pub use eval::Completion;
pub use file_provider::{ChangeToken, FileProvider, FileSystemProvider, MemoryFileProvider};
pub use filters::{AsyncFilter, FilterArguments, FilterRegistry};
pub use member_access::{MemberAccessRegistry, MemberAccessStrategy, MemberNameStrategy, MissingMemberPolicy};
pub use options::{EngineSettings, FormatOptions, TemplateOptions};
pub use output::{BufferPool, HtmlEncoder, NullEncoder, TextEncoder, TextSink, WriterSink};
pub use parser::{LiquidParser, ParseOutcome};
pub use tags::{CustomTag, TagBody, TagInvocation, TagSyntax, TagValue};
pub use template::Template;
pub use value::Value;

/// Parse with the built-in tags only.
pub fn parse(source: &str) -> Result<Template, ParseErrors> {
    LiquidParser::new().parse(source).into_result()
}

/// Parse and compile with the built-in tags only.
pub fn compile(source: &str) -> Result<CompiledTemplate, CompileError> {
    parse(source)?.compile()
}
