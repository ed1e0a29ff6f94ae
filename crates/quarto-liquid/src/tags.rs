/*
 * tags.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Host-registered tags.
//!
//! A custom tag declares which argument syntax it accepts and whether it is a
//! block (`{% name %}...{% endname %}`). The parser stores the parsed
//! argument; at render time the argument is evaluated and handed to
//! [`CustomTag::render`] together with the tag's body, if any.

use std::sync::Arc;

use crate::ast::Statement;
use crate::compiler::CompiledStatement;
use crate::context::TemplateContext;
use crate::error::RenderResult;
use crate::eval::{self, Completion};
use crate::filters::FilterArguments;
use crate::output::RenderOutput;
use crate::value::Value;

/// The argument grammar of a custom tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSyntax {
    /// `{% name %}`
    Empty,
    /// `{% name ident %}`
    Identifier,
    /// `{% name expression %}`
    Expression,
    /// `{% name a, key: b %}`
    Arguments,
}

/// The evaluated argument of a custom tag.
#[derive(Debug, Clone)]
pub enum TagValue {
    None,
    Identifier(String),
    Value(Value),
    Arguments(FilterArguments),
}

/// The body of a block tag, in whichever form the template is running.
#[derive(Clone, Copy)]
pub enum TagBody<'a> {
    Interpreted(&'a [Arc<Statement>]),
    Compiled(&'a [CompiledStatement]),
}

impl TagBody<'_> {
    /// Render the body in the current scope.
    pub fn render(&self, ctx: &mut TemplateContext, out: &mut RenderOutput<'_>) -> RenderResult<Completion> {
        match self {
            TagBody::Interpreted(statements) => eval::render_statements(statements, ctx, out),
            TagBody::Compiled(statements) => crate::compiler::run_statements(statements, ctx, out),
        }
    }
}

pub struct TagInvocation<'a> {
    pub argument: TagValue,
    pub body: Option<TagBody<'a>>,
}

pub trait CustomTag: Send + Sync {
    fn name(&self) -> &str;

    fn syntax(&self) -> TagSyntax;

    fn is_block(&self) -> bool {
        false
    }

    /// Whether templates using this tag may be compiled.
    fn is_sourceable(&self) -> bool {
        false
    }

    fn render(
        &self,
        invocation: &TagInvocation<'_>,
        ctx: &mut TemplateContext,
        out: &mut RenderOutput<'_>,
    ) -> RenderResult<Completion>;
}
