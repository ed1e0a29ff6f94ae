/*
 * eval/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tree-walking interpreter.
//!
//! Statements render into a [`RenderOutput`] and report how they completed;
//! a `break`, `continue` or partial-level return unwinds through enclosing
//! blocks as a [`Completion`] instead of an error. Expressions evaluate to a
//! [`Value`] and never fail on type mismatches, only on strict-mode misses,
//! filter errors and exhausted budgets.
//!
//! Every statement, every expression and every loop iteration counts one
//! step against the context's budget.

mod include;
mod loops;

use std::sync::Arc;

use tracing::{trace, warn};

use crate::ast::{
    BinaryOp, CaseStatement, CustomStatement, CycleStatement, Expression, ExpressionKind, FilterArgument,
    ForStatement, IfStatement, IncludeStatement, Statement, StatementKind, TagArgument, UnlessStatement,
};
use crate::context::{LAYOUT_BODY, ScopeKind, TemplateContext};
use crate::error::{RenderError, RenderResult};
use crate::filters::FilterArguments;
use crate::output::{BufferPool, NullEncoder, RenderOutput};
use crate::tags::{TagBody, TagInvocation, TagValue};
use crate::value::{Value, ops};

pub(crate) use include::{PartialRequest, render_include};
pub use loops::{LoopSequence, drive_loop, forloop_value};

/// How a statement finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    #[default]
    Normal,
    /// `{% break %}`: leave the innermost loop.
    Break,
    /// `{% continue %}`: next iteration of the innermost loop.
    Continue,
    /// Stop rendering the current template.
    Return,
}

/// Render statements in order, stopping at the first abnormal completion.
pub fn render_statements(
    statements: &[Arc<Statement>],
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
) -> RenderResult<Completion> {
    for statement in statements {
        let completion = render_statement(statement, ctx, out)?;
        if completion != Completion::Normal {
            return Ok(completion);
        }
    }
    Ok(Completion::Normal)
}

pub fn render_statement(
    statement: &Statement,
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
) -> RenderResult<Completion> {
    ctx.increment_steps()?;
    match &statement.kind {
        StatementKind::Text(text) | StatementKind::Raw(text) => out.write_text(text)?,
        StatementKind::Comment(_) => {}
        StatementKind::Output(output) => {
            let value = evaluate(&output.expression, ctx)?;
            out.write_value(&value, output.encode)?;
        }
        StatementKind::Assign(assign) => {
            let value = evaluate(&assign.value, ctx)?;
            ctx.set_value(assign.name.as_str(), value);
        }
        StatementKind::Capture(capture) => {
            let captured = capture_block(ctx, |scope, buffer| render_statements(&capture.body, scope, buffer))?;
            ctx.set_value(capture.name.as_str(), captured);
        }
        StatementKind::If(if_statement) => return render_if(if_statement, ctx, out),
        StatementKind::Unless(unless) => return render_unless(unless, ctx, out),
        StatementKind::Case(case) => return render_case(case, ctx, out),
        StatementKind::For(for_statement) => return render_for(for_statement, ctx, out),
        StatementKind::Break => return Ok(Completion::Break),
        StatementKind::Continue => return Ok(Completion::Continue),
        StatementKind::Cycle(cycle) => render_cycle(cycle, ctx, out)?,
        StatementKind::Increment(name) => {
            let value = ctx.increment_counter(name);
            out.write_value(&Value::from(value), false)?;
        }
        StatementKind::Decrement(name) => {
            let value = ctx.decrement_counter(name);
            out.write_value(&Value::from(value), false)?;
        }
        StatementKind::Include(include) => return evaluate_include(include, ctx, out),
        StatementKind::RenderBody => render_body(ctx, out)?,
        StatementKind::Custom(custom) => return render_custom(custom, ctx, out),
    }
    Ok(Completion::Normal)
}

/// Render into a pooled buffer in a block scope and return the text.
///
/// Captured text is never encoded; encoding happens when it is output.
pub(crate) fn capture_block(
    ctx: &mut TemplateContext,
    render: impl FnOnce(&mut TemplateContext, &mut RenderOutput<'_>) -> RenderResult<Completion>,
) -> RenderResult<String> {
    let mut buffer = BufferPool::shared().acquire();
    {
        let mut output = RenderOutput::new(&mut buffer, &NullEncoder);
        let mut scope = ctx.enter_child_scope(ScopeKind::Block);
        render(&mut scope, &mut output)?;
    }
    Ok(buffer.as_str().to_string())
}

/// `{% renderbody %}` writes the page body stored by the layout render.
pub(crate) fn render_body(ctx: &TemplateContext, out: &mut RenderOutput<'_>) -> RenderResult<()> {
    match ctx.ambient::<String>(LAYOUT_BODY) {
        Some(body) => out.write_text(&body),
        None => Err(RenderError::MissingAmbientValue {
            tag: "renderbody".to_string(),
            key: LAYOUT_BODY.to_string(),
        }),
    }
}

fn render_if(statement: &IfStatement, ctx: &mut TemplateContext, out: &mut RenderOutput<'_>) -> RenderResult<Completion> {
    for branch in &statement.branches {
        if evaluate(&branch.condition, ctx)?.to_boolean() {
            return render_statements(&branch.body, ctx, out);
        }
    }
    match &statement.else_body {
        Some(body) => render_statements(body, ctx, out),
        None => Ok(Completion::Normal),
    }
}

fn render_unless(
    statement: &UnlessStatement,
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
) -> RenderResult<Completion> {
    if !evaluate(&statement.condition, ctx)?.to_boolean() {
        return render_statements(&statement.body, ctx, out);
    }
    for branch in &statement.branches {
        if evaluate(&branch.condition, ctx)?.to_boolean() {
            return render_statements(&branch.body, ctx, out);
        }
    }
    match &statement.else_body {
        Some(body) => render_statements(body, ctx, out),
        None => Ok(Completion::Normal),
    }
}

fn render_case(statement: &CaseStatement, ctx: &mut TemplateContext, out: &mut RenderOutput<'_>) -> RenderResult<Completion> {
    let subject = evaluate(&statement.subject, ctx)?;
    for when in &statement.whens {
        for candidate in &when.values {
            if ops::equals(&subject, &evaluate(candidate, ctx)?) {
                return render_statements(&when.body, ctx, out);
            }
        }
    }
    match &statement.else_body {
        Some(body) => render_statements(body, ctx, out),
        None => Ok(Completion::Normal),
    }
}

fn render_for(statement: &ForStatement, ctx: &mut TemplateContext, out: &mut RenderOutput<'_>) -> RenderResult<Completion> {
    let sequence = match &statement.source.kind {
        ExpressionKind::Range { start, end } => {
            let start = evaluate(start, ctx)?;
            let end = evaluate(end, ctx)?;
            LoopSequence::from_range(&start, &end)
        }
        _ => LoopSequence::from_value(&evaluate(&statement.source, ctx)?),
    };
    let offset = evaluate_optional(statement.offset.as_deref(), ctx)?;
    let limit = evaluate_optional(statement.limit.as_deref(), ctx)?;
    let sequence = sequence.window(&offset, &limit, statement.reversed);

    if sequence.is_empty() {
        return match &statement.else_body {
            Some(body) => render_statements(body, ctx, out),
            None => Ok(Completion::Normal),
        };
    }
    drive_loop(ctx, out, &statement.variable, &sequence, |scope, out| {
        render_statements(&statement.body, scope, out)
    })
}

fn evaluate_optional(expression: Option<&Expression>, ctx: &mut TemplateContext) -> RenderResult<Value> {
    match expression {
        Some(expression) => evaluate(expression, ctx),
        None => Ok(Value::Nil),
    }
}

fn render_cycle(statement: &CycleStatement, ctx: &mut TemplateContext, out: &mut RenderOutput<'_>) -> RenderResult<()> {
    let values = statement
        .values
        .iter()
        .map(|value| evaluate(value, ctx))
        .collect::<RenderResult<Vec<_>>>()?;
    let group = match &statement.group {
        Some(group) => evaluate(group, ctx)?.to_string(),
        None => cycle_key(&values),
    };
    write_cycle(ctx, out, &group, &values)
}

/// Group key of an anonymous `cycle`: its values joined with commas.
pub(crate) fn cycle_key(values: &[Value]) -> String {
    values.iter().map(Value::to_string).collect::<Vec<_>>().join(",")
}

pub(crate) fn write_cycle(
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
    group: &str,
    values: &[Value],
) -> RenderResult<()> {
    if values.is_empty() {
        return Ok(());
    }
    let position = ctx.next_cycle(group, values.len());
    out.write_value(&values[position], true)
}

fn evaluate_include(
    statement: &IncludeStatement,
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
) -> RenderResult<Completion> {
    let name = evaluate(&statement.template, ctx)?.to_string();
    let with_value = match &statement.with_value {
        Some(expression) => Some(evaluate(expression, ctx)?),
        None => None,
    };
    let mut arguments = Vec::with_capacity(statement.arguments.len());
    for argument in &statement.arguments {
        arguments.push((argument.name.clone(), evaluate(&argument.value, ctx)?));
    }
    let request = PartialRequest {
        mode: statement.mode,
        name,
        with_value,
        alias: statement.alias.clone(),
        arguments,
    };
    render_include(ctx, out, request, |template, scope, out| {
        render_statements(&template.statements, scope, out)
    })
}

fn render_custom(custom: &CustomStatement, ctx: &mut TemplateContext, out: &mut RenderOutput<'_>) -> RenderResult<Completion> {
    let argument = match &custom.argument {
        TagArgument::None => TagValue::None,
        TagArgument::Identifier(name) => TagValue::Identifier(name.clone()),
        TagArgument::Expression(expression) => TagValue::Value(evaluate(expression, ctx)?),
        TagArgument::Arguments(arguments) => TagValue::Arguments(evaluate_arguments(arguments, ctx)?),
    };
    let invocation = TagInvocation {
        argument,
        body: custom.body.as_deref().map(TagBody::Interpreted),
    };
    custom.tag.render(&invocation, ctx, out)
}

// ============================================================================
// Expressions
// ============================================================================

pub fn evaluate(expression: &Expression, ctx: &mut TemplateContext) -> RenderResult<Value> {
    ctx.increment_steps()?;
    match &expression.kind {
        ExpressionKind::Literal(value) => Ok(value.clone()),
        ExpressionKind::Variable(name) => lookup_variable(name, ctx),
        ExpressionKind::Member { target, name } => {
            let target = evaluate(target, ctx)?;
            target.get_value(name, ctx)
        }
        ExpressionKind::Index { target, index } => {
            let target = evaluate(target, ctx)?;
            let index = evaluate(index, ctx)?;
            target.get_index(&index, ctx)
        }
        ExpressionKind::Range { start, end } => {
            let start = evaluate(start, ctx)?;
            let end = evaluate(end, ctx)?;
            materialize_range(&start, &end, ctx)
        }
        ExpressionKind::Binary { op, left, right } => {
            let left = evaluate(left, ctx)?;
            match op {
                BinaryOp::And if !left.to_boolean() => Ok(Value::Boolean(false)),
                BinaryOp::Or if left.to_boolean() => Ok(Value::Boolean(true)),
                BinaryOp::And | BinaryOp::Or => Ok(Value::Boolean(evaluate(right, ctx)?.to_boolean())),
                _ => {
                    let right = evaluate(right, ctx)?;
                    Ok(ops::binary(*op, &left, &right))
                }
            }
        }
        ExpressionKind::Filter(filter) => {
            let input = evaluate(&filter.input, ctx)?;
            let arguments = evaluate_arguments(&filter.arguments, ctx)?;
            apply_filter(&filter.name, input, &arguments, ctx)
        }
    }
}

fn evaluate_arguments(arguments: &[FilterArgument], ctx: &mut TemplateContext) -> RenderResult<FilterArguments> {
    let mut evaluated = FilterArguments::new();
    for argument in arguments {
        let value = evaluate(&argument.value, ctx)?;
        match &argument.name {
            Some(name) => evaluated.push_named(name.as_str(), value),
            None => evaluated.push(value),
        }
    }
    Ok(evaluated)
}

/// Read a variable; undefined names are an error in strict mode.
pub(crate) fn lookup_variable(name: &str, ctx: &TemplateContext) -> RenderResult<Value> {
    match ctx.try_get_value(name) {
        Some(value) => Ok(value.clone()),
        None if ctx.options().strict_variables => Err(RenderError::UndefinedVariable { name: name.to_string() }),
        None => Ok(Value::Undefined),
    }
}

/// Invoke a registered filter.
///
/// Unknown filters fail with strict filters and otherwise return their input.
pub(crate) fn apply_filter(
    name: &str,
    input: Value,
    arguments: &FilterArguments,
    ctx: &mut TemplateContext,
) -> RenderResult<Value> {
    let Some(filter) = ctx.options().filters.get(name).cloned() else {
        if ctx.options().strict_filters {
            return Err(RenderError::UnknownFilter { name: name.to_string() });
        }
        warn!(filter = name, "unknown filter, passing input through");
        return Ok(input);
    };
    trace!(filter = name, arguments = arguments.len(), "applying filter");
    filter.invoke(input, arguments, ctx)
}

/// Longest range that may be turned into an array value. Loops over ranges
/// are not bounded by this.
pub const MAX_RANGE_LENGTH: usize = 1_000_000;

/// `(start..end)` used as a value. Each element costs a step.
pub(crate) fn materialize_range(start: &Value, end: &Value, ctx: &mut TemplateContext) -> RenderResult<Value> {
    let sequence = LoopSequence::from_range(start, end);
    if sequence.len() > MAX_RANGE_LENGTH {
        return Err(RenderError::RangeTooLarge {
            length: sequence.len(),
            max_length: MAX_RANGE_LENGTH,
        });
    }
    let mut items = Vec::with_capacity(sequence.len());
    for index in 0..sequence.len() {
        ctx.increment_steps()?;
        items.push(sequence.get(index));
    }
    Ok(Value::array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TemplateOptions;
    use crate::parser::LiquidParser;
    use pretty_assertions::assert_eq;

    fn render_with(source: &str, ctx: &mut TemplateContext) -> RenderResult<String> {
        let template = LiquidParser::new().parse(source).into_result().unwrap();
        let mut sink = String::new();
        {
            let mut out = RenderOutput::new(&mut sink, &NullEncoder);
            render_statements(&template.statements, ctx, &mut out)?;
        }
        Ok(sink)
    }

    fn render(source: &str) -> String {
        render_with(source, &mut TemplateContext::new()).unwrap()
    }

    fn render_json(source: &str, data: serde_json::Value) -> String {
        let mut ctx = TemplateContext::from_json(&data, Arc::new(TemplateOptions::default()));
        render_with(source, &mut ctx).unwrap()
    }

    // ========================================================================
    // Output and expressions
    // ========================================================================

    #[test]
    fn test_output_and_filters() {
        assert_eq!(
            render_json("Hello {{ name | upcase }}!", serde_json::json!({"name": "ada"})),
            "Hello ADA!"
        );
        assert_eq!(render("{{ 1 | plus: 2 | times: 3 }}"), "9");
        assert_eq!(render("{{ missing }}|{{ missing.deep[0] }}"), "|");
    }

    #[test]
    fn test_member_and_index_access() {
        let data = serde_json::json!({"page": {"tags": ["a", "b", "c"], "title": "T"}});
        assert_eq!(
            render_json("{{ page.title }} {{ page.tags[1] }} {{ page.tags.size }} {{ page.tags[-1] }}", data.clone()),
            "T b 3 c"
        );
        assert_eq!(render_json("{{ page['title'] }}", data), "T");
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(render("{% if true or false and false %}y{% else %}n{% endif %}"), "y");
        assert_eq!(render("{% if false and missing.x %}y{% else %}n{% endif %}"), "n");
        assert_eq!(render("{% if 'abc' contains 'b' %}y{% endif %}"), "y");
        assert_eq!(render("{{ 7 / 2 }} {{ 7.0 / 2 }} {{ 1 + 'a' }}"), "3 3.5 ");
    }

    #[test]
    fn test_empty_and_blank() {
        let data = serde_json::json!({"items": [], "text": "  "});
        assert_eq!(
            render_json("{% if items == empty %}e{% endif %}{% if text == blank %}b{% endif %}", data),
            "eb"
        );
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    #[test]
    fn test_if_elsif_else() {
        let source = "{% if n > 2 %}big{% elsif n > 0 %}small{% else %}none{% endif %}";
        assert_eq!(render_json(source, serde_json::json!({"n": 5})), "big");
        assert_eq!(render_json(source, serde_json::json!({"n": 1})), "small");
        assert_eq!(render_json(source, serde_json::json!({"n": 0})), "none");
    }

    #[test]
    fn test_unless() {
        assert_eq!(render("{% unless false %}shown{% endunless %}"), "shown");
        assert_eq!(render("{% unless true %}a{% elsif true %}b{% else %}c{% endunless %}"), "b");
    }

    #[test]
    fn test_case_first_match_only() {
        let source = "{% case x %}{% when 1, 2 %}low{% when 2 %}two{% else %}other{% endcase %}";
        assert_eq!(render_json(source, serde_json::json!({"x": 2})), "low");
        assert_eq!(render_json(source, serde_json::json!({"x": 9})), "other");
    }

    #[test]
    fn test_for_loop_metadata() {
        assert_eq!(
            render("{% for i in (1..4) offset:1 limit:2 %}{{ forloop.index }}:{{ forloop.last }}{% endfor %}"),
            "1:false2:true"
        );
        assert_eq!(
            render("{% for i in (1..3) reversed %}{{ i }}{% endfor %}"),
            "321"
        );
    }

    #[test]
    fn test_for_else_and_dictionaries() {
        assert_eq!(render("{% for x in missing %}x{% else %}empty{% endfor %}"), "empty");
        assert_eq!(
            render_json(
                "{% for pair in d %}{{ pair[0] }}={{ pair[1] }};{% endfor %}",
                serde_json::json!({"d": {"a": 1, "b": 2}})
            ),
            "a=1;b=2;"
        );
    }

    #[test]
    fn test_break_and_continue() {
        assert_eq!(
            render("{% for i in (1..10) %}{% if i == 2 %}{% continue %}{% endif %}{% if i > 4 %}{% break %}{% endif %}{{ i }}{% endfor %}"),
            "134"
        );
    }

    #[test]
    fn test_nested_parentloop() {
        assert_eq!(
            render("{% for a in (1..2) %}{% for b in (1..2) %}{{ forloop.parentloop.index }}{{ b }} {% endfor %}{% endfor %}"),
            "11 12 21 22 "
        );
    }

    #[test]
    fn test_assign_in_loop_survives() {
        assert_eq!(
            render("{% for i in (1..3) %}{% assign last = i %}{% endfor %}{{ last }}{{ i }}"),
            "3"
        );
    }

    // ========================================================================
    // Variables and tag state
    // ========================================================================

    #[test]
    fn test_capture_is_scoped() {
        assert_eq!(
            render("{% capture greeting %}{% assign inner = 1 %}hi {{ 'x' }}{% endcapture %}{{ greeting }}[{{ inner }}]"),
            "hi x[]"
        );
    }

    #[test]
    fn test_capture_updates_outer_variable() {
        let mut ctx = TemplateContext::new();
        ctx.set_value("title", "old");
        let out = render_with("{% capture title %}new{% endcapture %}{{ title }}", &mut ctx).unwrap();
        assert_eq!(out, "new");
        assert_eq!(ctx.get_value("title"), Value::from("new"));
    }

    #[test]
    fn test_cycle() {
        assert_eq!(
            render("{% for i in (1..4) %}{% cycle 'a', 'b', 'c' %}{% endfor %}"),
            "abca"
        );
        assert_eq!(
            render("{% cycle 'g': 1, 2 %}{% cycle 1, 2 %}{% cycle 'g': 1, 2 %}"),
            "112"
        );
    }

    #[test]
    fn test_increment_and_decrement() {
        assert_eq!(
            render("{% increment n %}{% increment n %}{% decrement m %}{% decrement n %}"),
            "01-11"
        );
    }

    // ========================================================================
    // Strictness and budgets
    // ========================================================================

    #[test]
    fn test_strict_variables() {
        let options = TemplateOptions::default().with_strict_variables(true);
        let mut ctx = TemplateContext::with_options(Arc::new(options));
        let err = render_with("{{ nope }}", &mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "Undefined variable: nope");
    }

    #[test]
    fn test_unknown_filter_leniency() {
        assert_eq!(render("{{ 'a' | nonexistent }}"), "a");

        let options = TemplateOptions::default().with_strict_filters(true);
        let mut ctx = TemplateContext::with_options(Arc::new(options));
        assert!(matches!(
            render_with("{{ 'a' | nonexistent }}", &mut ctx),
            Err(RenderError::UnknownFilter { .. })
        ));
    }

    #[test]
    fn test_huge_range_value_is_rejected() {
        let mut ctx = TemplateContext::new();
        let err = render_with("{% assign r = (1..1000000000000) %}{{ r | size }}", &mut ctx).unwrap_err();
        assert!(matches!(
            err,
            RenderError::RangeTooLarge { length: 1_000_000_000_000, max_length: MAX_RANGE_LENGTH }
        ));

        let mut ctx = TemplateContext::new();
        let looped = render_with("{% for i in (1..1000000000000) limit: 3 %}{{ i }}{% endfor %}", &mut ctx);
        assert_eq!(looped.unwrap(), "123");
    }

    #[test]
    fn test_step_budget_stops_runaway_loop() {
        let options = TemplateOptions::default().with_max_steps(100);
        let mut ctx = TemplateContext::with_options(Arc::new(options));
        let err = render_with("{% for i in (1..1000000) %}{{ i }}{% endfor %}", &mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::StepBudgetExceeded { max_steps: 100 }));
        assert_eq!(ctx.scope_depth(), 1);
    }

    #[test]
    fn test_renderbody_requires_layout() {
        let err = render_with("{% renderbody %}", &mut TemplateContext::new()).unwrap_err();
        assert!(matches!(err, RenderError::MissingAmbientValue { .. }));

        let mut ctx = TemplateContext::new();
        ctx.set_ambient(LAYOUT_BODY, "<main/>".to_string());
        assert_eq!(render_with("[{% renderbody %}]", &mut ctx).unwrap(), "[<main/>]");
    }

    #[test]
    fn test_raw_and_comment() {
        assert_eq!(render("{% raw %}{{ x }}{% endraw %}{% comment %}hidden{% endcomment %}"), "{{ x }}");
    }
}
