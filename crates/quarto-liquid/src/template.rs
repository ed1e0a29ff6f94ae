/*
 * template.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parsed templates.
//!
//! A [`Template`] is immutable after parsing and may be rendered any number
//! of times, concurrently, each render with its own [`TemplateContext`].

use std::sync::Arc;

use tracing::debug;

use crate::ast::{Block, Rewriter};
use crate::compiler::{self, CompiledTemplate};
use crate::context::{CURRENT_PATH, LAYOUT_BODY, TemplateContext};
use crate::error::{CompileError, RenderResult};
use crate::eval;
use crate::output::{BufferPool, NullEncoder, RenderOutput, TextEncoder, TextSink};
use crate::parser::DEFAULT_TEMPLATE_NAME;

#[derive(Debug, Clone)]
pub struct Template {
    pub statements: Block,
    name: String,
    source: Arc<str>,
}

impl Template {
    pub fn new(name: impl Into<String>, source: Arc<str>, statements: Block) -> Self {
        Self {
            statements,
            name: name.into(),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn source_arc(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    /// Render to a string without encoding.
    pub fn render(&self, ctx: &mut TemplateContext) -> RenderResult<String> {
        let mut buffer = BufferPool::shared().acquire();
        self.render_to(&mut buffer, &NullEncoder, ctx)?;
        Ok(buffer.as_str().to_string())
    }

    /// Render into `sink`, passing output values through `encoder`.
    pub fn render_to(
        &self,
        sink: &mut dyn TextSink,
        encoder: &dyn TextEncoder,
        ctx: &mut TemplateContext,
    ) -> RenderResult<()> {
        let mut out = RenderOutput::new(sink, encoder);
        with_current_path(ctx, &self.name, |ctx| {
            eval::render_statements(&self.statements, ctx, &mut out)
        })?;
        out.flush()
    }

    /// Render this template as the body of `layout`; the layout places it
    /// with `{% renderbody %}`.
    pub fn render_with_layout(&self, layout: &Template, ctx: &mut TemplateContext) -> RenderResult<String> {
        let mut buffer = BufferPool::shared().acquire();
        self.render_with_layout_to(layout, &mut buffer, &NullEncoder, ctx)?;
        Ok(buffer.as_str().to_string())
    }

    pub fn render_with_layout_to(
        &self,
        layout: &Template,
        sink: &mut dyn TextSink,
        encoder: &dyn TextEncoder,
        ctx: &mut TemplateContext,
    ) -> RenderResult<()> {
        let mut body = BufferPool::shared().acquire();
        self.render_to(&mut body, encoder, ctx)?;
        debug!(template = %self.name, layout = %layout.name, bytes = body.len(), "rendering layout");

        let previous = ctx.remove_ambient(LAYOUT_BODY);
        ctx.set_ambient(LAYOUT_BODY, body.as_str().to_string());
        let result = layout.render_to(sink, encoder, ctx);
        ctx.restore_ambient(LAYOUT_BODY, previous);
        result
    }

    /// Lower to closures. Fails when a node has no compiled form.
    pub fn compile(&self) -> Result<CompiledTemplate, CompileError> {
        compiler::compile_template(self)
    }

    /// Apply a rewriter, keeping name and source.
    pub fn rewrite<R: Rewriter + ?Sized>(&self, rewriter: &mut R) -> Template {
        Template {
            statements: rewriter.rewrite_block(&self.statements),
            name: self.name.clone(),
            source: Arc::clone(&self.source),
        }
    }
}

/// Run `render` with `name` as the path partials resolve against, unless
/// an enclosing render already set one.
pub(crate) fn with_current_path<T>(
    ctx: &mut TemplateContext,
    name: &str,
    render: impl FnOnce(&mut TemplateContext) -> RenderResult<T>,
) -> RenderResult<T> {
    if ctx.has_ambient(CURRENT_PATH) || name == DEFAULT_TEMPLATE_NAME {
        return render(ctx);
    }
    ctx.set_ambient(CURRENT_PATH, name.to_string());
    let result = render(ctx);
    ctx.remove_ambient(CURRENT_PATH);
    result
}
