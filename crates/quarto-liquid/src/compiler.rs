/*
 * compiler.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Ahead-of-time lowering of templates to closures.
//!
//! Each statement becomes a [`CompiledStatement`] and each expression a
//! [`CompiledExpression`]; rendering a [`CompiledTemplate`] calls closures
//! instead of matching on AST nodes. Compiled code is observably identical
//! to the interpreter: same output, same errors, same step counts. It reuses
//! the interpreter's helpers for anything beyond dispatch.
//!
//! Lowering is memoized by [`NodeId`], so a subtree shared between parents
//! (as rewriters produce) is lowered once. Templates using a custom tag that
//! is not sourceable cannot be compiled.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::ast::visitor::{Visitor, walk_custom};
use crate::ast::{
    BinaryOp, Block, CustomStatement, Expression, ExpressionKind, FilterArgument, NodeId,
    Statement, StatementKind, TagArgument,
};
use crate::context::TemplateContext;
use crate::diagnostics::LineIndex;
use crate::error::{CompileError, RenderError, RenderResult};
use crate::eval::{self, Completion, LoopSequence, PartialRequest};
use crate::filters::FilterArguments;
use crate::output::{BufferPool, NullEncoder, RenderOutput, TextEncoder, TextSink};
use crate::tags::{CustomTag, TagBody, TagInvocation, TagValue};
use crate::template::{Template, with_current_path};
use crate::value::{Value, ops};

pub type CompiledStatement =
    Arc<dyn Fn(&mut TemplateContext, &mut RenderOutput<'_>) -> RenderResult<Completion> + Send + Sync>;

pub type CompiledExpression = Arc<dyn Fn(&mut TemplateContext) -> RenderResult<Value> + Send + Sync>;

type CompiledBlock = Arc<[CompiledStatement]>;

/// Ambient key of the per-render cache of compiled partials.
const COMPILED_PARTIALS: &str = "quarto_liquid.compiled_partials";

/// A template lowered to closures.
#[derive(Clone)]
pub struct CompiledTemplate {
    name: String,
    statements: CompiledBlock,
}

impl CompiledTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, ctx: &mut TemplateContext) -> RenderResult<String> {
        let mut buffer = BufferPool::shared().acquire();
        self.render_to(&mut buffer, &NullEncoder, ctx)?;
        Ok(buffer.as_str().to_string())
    }

    pub fn render_to(
        &self,
        sink: &mut dyn TextSink,
        encoder: &dyn TextEncoder,
        ctx: &mut TemplateContext,
    ) -> RenderResult<()> {
        let mut out = RenderOutput::new(sink, encoder);
        with_current_path(ctx, &self.name, |ctx| run_statements(&self.statements, ctx, &mut out))?;
        out.flush()
    }
}

impl std::fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("statements", &self.statements.len())
            .finish()
    }
}

/// Run compiled statements in order, stopping at the first abnormal completion.
pub fn run_statements(
    statements: &[CompiledStatement],
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
) -> RenderResult<Completion> {
    for statement in statements {
        let completion = statement(ctx, out)?;
        if completion != Completion::Normal {
            return Ok(completion);
        }
    }
    Ok(Completion::Normal)
}

pub fn compile_template(template: &Template) -> Result<CompiledTemplate, CompileError> {
    let mut check = SourceabilityCheck { first: None };
    check.visit_block(&template.statements);
    if let Some(statement) = check.first {
        let (line, column) = LineIndex::new(template.source()).location(template.source(), statement.span.start);
        return Err(CompileError::UnsourceableNode {
            node_type: statement.type_name(),
            line,
            column,
        });
    }

    let mut compiler = Compiler::default();
    let statements = compiler.block(&template.statements);
    debug!(
        template = template.name(),
        statements = compiler.statements.len(),
        expressions = compiler.expressions.len(),
        "compiled template"
    );
    Ok(CompiledTemplate {
        name: template.name().to_string(),
        statements,
    })
}

/// Finds the first custom tag without a compiled form.
struct SourceabilityCheck<'ast> {
    first: Option<&'ast Statement>,
}

impl<'ast> Visitor<'ast> for SourceabilityCheck<'ast> {
    fn visit_custom(&mut self, statement: &'ast Statement, custom: &'ast CustomStatement) {
        if self.first.is_none() && !custom.tag.is_sourceable() {
            self.first = Some(statement);
        }
        walk_custom(self, custom);
    }
}

fn lowered<F>(f: F) -> CompiledStatement
where
    F: Fn(&mut TemplateContext, &mut RenderOutput<'_>) -> RenderResult<Completion> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &mut TemplateContext, out: &mut RenderOutput<'_>| {
        ctx.increment_steps()?;
        f(ctx, out)
    })
}

fn lowered_expression<F>(f: F) -> CompiledExpression
where
    F: Fn(&mut TemplateContext) -> RenderResult<Value> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &mut TemplateContext| {
        ctx.increment_steps()?;
        f(ctx)
    })
}

fn run_optional(
    block: &Option<CompiledBlock>,
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
) -> RenderResult<Completion> {
    match block {
        Some(block) => run_statements(block, ctx, out),
        None => Ok(Completion::Normal),
    }
}

enum LoopSource {
    Range(CompiledExpression, CompiledExpression),
    Value(CompiledExpression),
}

enum CompiledTagArgument {
    None,
    Identifier(String),
    Expression(CompiledExpression),
    Arguments(Vec<(Option<String>, CompiledExpression)>),
}

#[derive(Default)]
struct Compiler {
    statements: HashMap<NodeId, CompiledStatement>,
    expressions: HashMap<NodeId, CompiledExpression>,
}

impl Compiler {
    fn block(&mut self, block: &Block) -> CompiledBlock {
        block.iter().map(|statement| self.statement(statement)).collect()
    }

    fn optional_block(&mut self, block: &Option<Block>) -> Option<CompiledBlock> {
        block.as_ref().map(|block| self.block(block))
    }

    fn statement(&mut self, statement: &Statement) -> CompiledStatement {
        if let Some(compiled) = self.statements.get(&statement.id) {
            return Arc::clone(compiled);
        }
        let compiled = self.lower_statement(statement);
        self.statements.insert(statement.id, Arc::clone(&compiled));
        compiled
    }

    fn lower_statement(&mut self, statement: &Statement) -> CompiledStatement {
        match &statement.kind {
            StatementKind::Text(text) | StatementKind::Raw(text) => {
                let text = Arc::clone(text);
                lowered(move |_, out| {
                    out.write_text(&text)?;
                    Ok(Completion::Normal)
                })
            }
            StatementKind::Comment(_) => lowered(|_, _| Ok(Completion::Normal)),
            StatementKind::Output(output) => {
                let expression = self.expression(&output.expression);
                let encode = output.encode;
                lowered(move |ctx, out| {
                    let value = expression(ctx)?;
                    out.write_value(&value, encode)?;
                    Ok(Completion::Normal)
                })
            }
            StatementKind::Assign(assign) => {
                let name = assign.name.clone();
                let value = self.expression(&assign.value);
                lowered(move |ctx, _| {
                    let value = value(ctx)?;
                    ctx.set_value(name.as_str(), value);
                    Ok(Completion::Normal)
                })
            }
            StatementKind::Capture(capture) => {
                let name = capture.name.clone();
                let body = self.block(&capture.body);
                lowered(move |ctx, _| {
                    let captured = eval::capture_block(ctx, |scope, buffer| run_statements(&body, scope, buffer))?;
                    ctx.set_value(name.as_str(), captured);
                    Ok(Completion::Normal)
                })
            }
            StatementKind::If(statement) => {
                let branches = self.branches(
                    statement
                        .branches
                        .iter()
                        .map(|branch| (&branch.condition, &branch.body)),
                );
                let else_body = self.optional_block(&statement.else_body);
                lowered(move |ctx, out| {
                    for (condition, body) in branches.iter() {
                        if condition(ctx)?.to_boolean() {
                            return run_statements(body, ctx, out);
                        }
                    }
                    run_optional(&else_body, ctx, out)
                })
            }
            StatementKind::Unless(statement) => {
                let condition = self.expression(&statement.condition);
                let body = self.block(&statement.body);
                let branches = self.branches(
                    statement
                        .branches
                        .iter()
                        .map(|branch| (&branch.condition, &branch.body)),
                );
                let else_body = self.optional_block(&statement.else_body);
                lowered(move |ctx, out| {
                    if !condition(ctx)?.to_boolean() {
                        return run_statements(&body, ctx, out);
                    }
                    for (condition, body) in branches.iter() {
                        if condition(ctx)?.to_boolean() {
                            return run_statements(body, ctx, out);
                        }
                    }
                    run_optional(&else_body, ctx, out)
                })
            }
            StatementKind::Case(statement) => {
                let subject = self.expression(&statement.subject);
                let whens: Vec<(Vec<CompiledExpression>, CompiledBlock)> = statement
                    .whens
                    .iter()
                    .map(|when| {
                        let values: Vec<CompiledExpression> =
                            when.values.iter().map(|value| self.expression(value)).collect();
                        (values, self.block(&when.body))
                    })
                    .collect();
                let else_body = self.optional_block(&statement.else_body);
                lowered(move |ctx, out| {
                    let subject = subject(ctx)?;
                    for (values, body) in &whens {
                        for candidate in values {
                            if ops::equals(&subject, &candidate(ctx)?) {
                                return run_statements(body, ctx, out);
                            }
                        }
                    }
                    run_optional(&else_body, ctx, out)
                })
            }
            StatementKind::For(statement) => {
                let source = match &statement.source.kind {
                    ExpressionKind::Range { start, end } => {
                        LoopSource::Range(self.expression(start), self.expression(end))
                    }
                    _ => LoopSource::Value(self.expression(&statement.source)),
                };
                let offset = statement.offset.as_ref().map(|e| self.expression(e));
                let limit = statement.limit.as_ref().map(|e| self.expression(e));
                let reversed = statement.reversed;
                let variable = statement.variable.clone();
                let body = self.block(&statement.body);
                let else_body = self.optional_block(&statement.else_body);
                lowered(move |ctx, out| {
                    let sequence = match &source {
                        LoopSource::Range(start, end) => {
                            let start = start(ctx)?;
                            let end = end(ctx)?;
                            LoopSequence::from_range(&start, &end)
                        }
                        LoopSource::Value(source) => LoopSequence::from_value(&source(ctx)?),
                    };
                    let offset = evaluate_optional(&offset, ctx)?;
                    let limit = evaluate_optional(&limit, ctx)?;
                    let sequence = sequence.window(&offset, &limit, reversed);
                    if sequence.is_empty() {
                        return run_optional(&else_body, ctx, out);
                    }
                    eval::drive_loop(ctx, out, &variable, &sequence, |scope, out| {
                        run_statements(&body, scope, out)
                    })
                })
            }
            StatementKind::Break => lowered(|_, _| Ok(Completion::Break)),
            StatementKind::Continue => lowered(|_, _| Ok(Completion::Continue)),
            StatementKind::Cycle(cycle) => {
                let group = cycle.group.as_ref().map(|group| self.expression(group));
                let values: Vec<CompiledExpression> = cycle.values.iter().map(|v| self.expression(v)).collect();
                lowered(move |ctx, out| {
                    let values = values
                        .iter()
                        .map(|value| value(ctx))
                        .collect::<RenderResult<Vec<_>>>()?;
                    let group = match &group {
                        Some(group) => group(ctx)?.to_string(),
                        None => eval::cycle_key(&values),
                    };
                    eval::write_cycle(ctx, out, &group, &values)?;
                    Ok(Completion::Normal)
                })
            }
            StatementKind::Increment(name) => {
                let name = name.clone();
                lowered(move |ctx, out| {
                    let value = ctx.increment_counter(&name);
                    out.write_value(&Value::from(value), false)?;
                    Ok(Completion::Normal)
                })
            }
            StatementKind::Decrement(name) => {
                let name = name.clone();
                lowered(move |ctx, out| {
                    let value = ctx.decrement_counter(&name);
                    out.write_value(&Value::from(value), false)?;
                    Ok(Completion::Normal)
                })
            }
            StatementKind::Include(include) => {
                let mode = include.mode;
                let template = self.expression(&include.template);
                let with_value = include.with_value.as_ref().map(|e| self.expression(e));
                let alias = include.alias.clone();
                let arguments: Vec<(String, CompiledExpression)> = include
                    .arguments
                    .iter()
                    .map(|argument| (argument.name.clone(), self.expression(&argument.value)))
                    .collect();
                lowered(move |ctx, out| {
                    let name = template(ctx)?.to_string();
                    let with_value = match &with_value {
                        Some(value) => Some(value(ctx)?),
                        None => None,
                    };
                    let mut evaluated = Vec::with_capacity(arguments.len());
                    for (name, value) in &arguments {
                        evaluated.push((name.clone(), value(ctx)?));
                    }
                    let request = PartialRequest {
                        mode,
                        name,
                        with_value,
                        alias: alias.clone(),
                        arguments: evaluated,
                    };
                    eval::render_include(ctx, out, request, render_compiled_partial)
                })
            }
            StatementKind::RenderBody => lowered(|ctx, out| {
                eval::render_body(ctx, out)?;
                Ok(Completion::Normal)
            }),
            StatementKind::Custom(custom) => {
                let tag: Arc<dyn CustomTag> = Arc::clone(&custom.tag);
                let argument = match &custom.argument {
                    TagArgument::None => CompiledTagArgument::None,
                    TagArgument::Identifier(name) => CompiledTagArgument::Identifier(name.clone()),
                    TagArgument::Expression(expression) => CompiledTagArgument::Expression(self.expression(expression)),
                    TagArgument::Arguments(arguments) => CompiledTagArgument::Arguments(self.arguments(arguments)),
                };
                let body = self.optional_block(&custom.body);
                lowered(move |ctx, out| {
                    let argument = match &argument {
                        CompiledTagArgument::None => TagValue::None,
                        CompiledTagArgument::Identifier(name) => TagValue::Identifier(name.clone()),
                        CompiledTagArgument::Expression(expression) => TagValue::Value(expression(ctx)?),
                        CompiledTagArgument::Arguments(arguments) => {
                            TagValue::Arguments(evaluate_arguments(arguments, ctx)?)
                        }
                    };
                    let invocation = TagInvocation {
                        argument,
                        body: body.as_deref().map(TagBody::Compiled),
                    };
                    tag.render(&invocation, ctx, out)
                })
            }
        }
    }

    fn branches<'a>(
        &mut self,
        branches: impl Iterator<Item = (&'a Arc<Expression>, &'a Block)>,
    ) -> Arc<[(CompiledExpression, CompiledBlock)]> {
        branches
            .map(|(condition, body)| (self.expression(condition), self.block(body)))
            .collect()
    }

    fn arguments(&mut self, arguments: &[FilterArgument]) -> Vec<(Option<String>, CompiledExpression)> {
        arguments
            .iter()
            .map(|argument| (argument.name.clone(), self.expression(&argument.value)))
            .collect()
    }

    fn expression(&mut self, expression: &Expression) -> CompiledExpression {
        if let Some(compiled) = self.expressions.get(&expression.id) {
            return Arc::clone(compiled);
        }
        let compiled = self.lower_expression(expression);
        self.expressions.insert(expression.id, Arc::clone(&compiled));
        compiled
    }

    fn lower_expression(&mut self, expression: &Expression) -> CompiledExpression {
        match &expression.kind {
            ExpressionKind::Literal(value) => {
                let value = value.clone();
                lowered_expression(move |_| Ok(value.clone()))
            }
            ExpressionKind::Variable(name) => {
                let name = name.clone();
                lowered_expression(move |ctx| eval::lookup_variable(&name, ctx))
            }
            ExpressionKind::Member { target, name } => {
                let target = self.expression(target);
                let name = name.clone();
                lowered_expression(move |ctx| {
                    let target = target(ctx)?;
                    target.get_value(&name, ctx)
                })
            }
            ExpressionKind::Index { target, index } => {
                let target = self.expression(target);
                let index = self.expression(index);
                lowered_expression(move |ctx| {
                    let target = target(ctx)?;
                    let index = index(ctx)?;
                    target.get_index(&index, ctx)
                })
            }
            ExpressionKind::Range { start, end } => {
                let start = self.expression(start);
                let end = self.expression(end);
                lowered_expression(move |ctx| {
                    let start = start(ctx)?;
                    let end = end(ctx)?;
                    eval::materialize_range(&start, &end, ctx)
                })
            }
            ExpressionKind::Binary { op, left, right } => {
                let op = *op;
                let left = self.expression(left);
                let right = self.expression(right);
                match op {
                    BinaryOp::And => lowered_expression(move |ctx| {
                        Ok(Value::Boolean(left(ctx)?.to_boolean() && right(ctx)?.to_boolean()))
                    }),
                    BinaryOp::Or => lowered_expression(move |ctx| {
                        Ok(Value::Boolean(left(ctx)?.to_boolean() || right(ctx)?.to_boolean()))
                    }),
                    _ => lowered_expression(move |ctx| {
                        let left = left(ctx)?;
                        let right = right(ctx)?;
                        Ok(ops::binary(op, &left, &right))
                    }),
                }
            }
            ExpressionKind::Filter(filter) => {
                let input = self.expression(&filter.input);
                let name = filter.name.clone();
                let arguments = self.arguments(&filter.arguments);
                lowered_expression(move |ctx| {
                    let input = input(ctx)?;
                    let arguments = evaluate_arguments(&arguments, ctx)?;
                    eval::apply_filter(&name, input, &arguments, ctx)
                })
            }
        }
    }
}

fn evaluate_optional(expression: &Option<CompiledExpression>, ctx: &mut TemplateContext) -> RenderResult<Value> {
    match expression {
        Some(expression) => expression(ctx),
        None => Ok(Value::Nil),
    }
}

fn evaluate_arguments(
    arguments: &[(Option<String>, CompiledExpression)],
    ctx: &mut TemplateContext,
) -> RenderResult<FilterArguments> {
    let mut evaluated = FilterArguments::new();
    for (name, value) in arguments {
        let value = value(ctx)?;
        match name {
            Some(name) => evaluated.push_named(name.as_str(), value),
            None => evaluated.push(value),
        }
    }
    Ok(evaluated)
}

type CompiledPartials = DashMap<String, Arc<CompiledTemplate>>;

/// Render a partial loaded at runtime with compiled code. A partial that
/// cannot be compiled fails the render.
fn render_compiled_partial(
    template: &Template,
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
) -> RenderResult<Completion> {
    if !ctx.has_ambient(COMPILED_PARTIALS) {
        ctx.set_ambient(COMPILED_PARTIALS, CompiledPartials::default());
    }
    let compile = || -> RenderResult<Arc<CompiledTemplate>> {
        compile_template(template).map(Arc::new).map_err(|source| {
            debug!(template = template.name(), error = %source, "partial is not compilable");
            RenderError::PartialCompile {
                path: template.name().to_string(),
                source,
            }
        })
    };
    let compiled = match ctx.ambient::<CompiledPartials>(COMPILED_PARTIALS) {
        Some(cache) => {
            let entry = cache.entry(template.name().to_string()).or_try_insert_with(compile)?;
            Arc::clone(entry.value())
        }
        None => compile()?,
    };
    run_statements(&compiled.statements, ctx, out)
}
