/*
 * ast/rewriter.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tree-to-tree transformations.
//!
//! A [`Rewriter`] maps nodes to nodes without mutating its input. The default
//! methods rewrite children and rebuild a node only when one of its children
//! came back as a different `Arc`; untouched subtrees are shared between the
//! old tree and the new one. Rebuilt nodes get a fresh [`super::NodeId`].

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    AssignStatement, Block, CaptureStatement, CaseStatement, ConditionalBranch, CustomStatement,
    CycleStatement, Expression, ExpressionKind, FilterArgument, FilterExpression, ForStatement,
    IfStatement, IncludeStatement, NamedArgument, OutputStatement, Statement, StatementKind,
    TagArgument, UnlessStatement, WhenBranch,
};

pub trait Rewriter {
    fn rewrite_block(&mut self, block: &Block) -> Block {
        block.iter().map(|s| self.rewrite_statement(s)).collect()
    }

    fn rewrite_statement(&mut self, statement: &Arc<Statement>) -> Arc<Statement> {
        rewrite_statement_children(self, statement)
    }

    fn rewrite_expression(&mut self, expression: &Arc<Expression>) -> Arc<Expression> {
        rewrite_expression_children(self, expression)
    }
}

/// Records whether any rewritten child differs from its original.
struct Tracker {
    changed: bool,
}

impl Tracker {
    fn expression<R: Rewriter + ?Sized>(&mut self, rewriter: &mut R, expression: &Arc<Expression>) -> Arc<Expression> {
        let rewritten = rewriter.rewrite_expression(expression);
        if !Arc::ptr_eq(&rewritten, expression) {
            self.changed = true;
        }
        rewritten
    }

    fn optional_expression<R: Rewriter + ?Sized>(
        &mut self,
        rewriter: &mut R,
        expression: &Option<Arc<Expression>>,
    ) -> Option<Arc<Expression>> {
        expression.as_ref().map(|e| self.expression(rewriter, e))
    }

    fn block<R: Rewriter + ?Sized>(&mut self, rewriter: &mut R, block: &Block) -> Block {
        let rewritten = rewriter.rewrite_block(block);
        if rewritten.len() != block.len()
            || rewritten.iter().zip(block).any(|(new, old)| !Arc::ptr_eq(new, old))
        {
            self.changed = true;
        }
        rewritten
    }

    fn optional_block<R: Rewriter + ?Sized>(&mut self, rewriter: &mut R, block: &Option<Block>) -> Option<Block> {
        block.as_ref().map(|b| self.block(rewriter, b))
    }

    fn branches<R: Rewriter + ?Sized>(
        &mut self,
        rewriter: &mut R,
        branches: &[ConditionalBranch],
    ) -> Vec<ConditionalBranch> {
        branches
            .iter()
            .map(|branch| ConditionalBranch {
                condition: self.expression(rewriter, &branch.condition),
                body: self.block(rewriter, &branch.body),
            })
            .collect()
    }

    fn arguments<R: Rewriter + ?Sized>(&mut self, rewriter: &mut R, arguments: &[FilterArgument]) -> Vec<FilterArgument> {
        arguments
            .iter()
            .map(|argument| FilterArgument {
                name: argument.name.clone(),
                value: self.expression(rewriter, &argument.value),
            })
            .collect()
    }
}

/// Rewrite the children of a statement, rebuilding it only if any changed.
pub fn rewrite_statement_children<R: Rewriter + ?Sized>(
    rewriter: &mut R,
    statement: &Arc<Statement>,
) -> Arc<Statement> {
    let mut tracker = Tracker { changed: false };
    let t = &mut tracker;

    let kind = match &statement.kind {
        StatementKind::Output(output) => StatementKind::Output(OutputStatement {
            expression: t.expression(rewriter, &output.expression),
            encode: output.encode,
        }),
        StatementKind::Assign(assign) => StatementKind::Assign(AssignStatement {
            name: assign.name.clone(),
            value: t.expression(rewriter, &assign.value),
        }),
        StatementKind::Capture(capture) => StatementKind::Capture(CaptureStatement {
            name: capture.name.clone(),
            body: t.block(rewriter, &capture.body),
        }),
        StatementKind::If(if_statement) => StatementKind::If(IfStatement {
            branches: t.branches(rewriter, &if_statement.branches),
            else_body: t.optional_block(rewriter, &if_statement.else_body),
        }),
        StatementKind::Unless(unless) => StatementKind::Unless(UnlessStatement {
            condition: t.expression(rewriter, &unless.condition),
            body: t.block(rewriter, &unless.body),
            branches: t.branches(rewriter, &unless.branches),
            else_body: t.optional_block(rewriter, &unless.else_body),
        }),
        StatementKind::Case(case) => {
            let subject = t.expression(rewriter, &case.subject);
            let whens = case
                .whens
                .iter()
                .map(|when| WhenBranch {
                    values: when.values.iter().map(|v| t.expression(rewriter, v)).collect(),
                    body: t.block(rewriter, &when.body),
                })
                .collect();
            StatementKind::Case(CaseStatement {
                subject,
                whens,
                else_body: t.optional_block(rewriter, &case.else_body),
            })
        }
        StatementKind::For(for_statement) => StatementKind::For(ForStatement {
            variable: for_statement.variable.clone(),
            source: t.expression(rewriter, &for_statement.source),
            limit: t.optional_expression(rewriter, &for_statement.limit),
            offset: t.optional_expression(rewriter, &for_statement.offset),
            reversed: for_statement.reversed,
            body: t.block(rewriter, &for_statement.body),
            else_body: t.optional_block(rewriter, &for_statement.else_body),
        }),
        StatementKind::Cycle(cycle) => StatementKind::Cycle(CycleStatement {
            group: t.optional_expression(rewriter, &cycle.group),
            values: cycle.values.iter().map(|v| t.expression(rewriter, v)).collect(),
        }),
        StatementKind::Include(include) => StatementKind::Include(IncludeStatement {
            mode: include.mode,
            template: t.expression(rewriter, &include.template),
            with_value: t.optional_expression(rewriter, &include.with_value),
            alias: include.alias.clone(),
            arguments: include
                .arguments
                .iter()
                .map(|argument| NamedArgument {
                    name: argument.name.clone(),
                    value: t.expression(rewriter, &argument.value),
                })
                .collect(),
        }),
        StatementKind::Custom(custom) => {
            let argument = match &custom.argument {
                TagArgument::Expression(expression) => TagArgument::Expression(t.expression(rewriter, expression)),
                TagArgument::Arguments(arguments) => TagArgument::Arguments(t.arguments(rewriter, arguments)),
                other => other.clone(),
            };
            StatementKind::Custom(CustomStatement {
                tag: Arc::clone(&custom.tag),
                argument,
                body: t.optional_block(rewriter, &custom.body),
            })
        }
        StatementKind::Text(_)
        | StatementKind::Break
        | StatementKind::Continue
        | StatementKind::Comment(_)
        | StatementKind::Raw(_)
        | StatementKind::Increment(_)
        | StatementKind::Decrement(_)
        | StatementKind::RenderBody => return Arc::clone(statement),
    };

    if tracker.changed {
        Statement::new(kind, statement.span)
    } else {
        Arc::clone(statement)
    }
}

/// Rewrite the children of an expression, rebuilding it only if any changed.
pub fn rewrite_expression_children<R: Rewriter + ?Sized>(
    rewriter: &mut R,
    expression: &Arc<Expression>,
) -> Arc<Expression> {
    let mut tracker = Tracker { changed: false };
    let t = &mut tracker;

    let kind = match &expression.kind {
        ExpressionKind::Literal(_) | ExpressionKind::Variable(_) => return Arc::clone(expression),
        ExpressionKind::Member { target, name } => ExpressionKind::Member {
            target: t.expression(rewriter, target),
            name: name.clone(),
        },
        ExpressionKind::Index { target, index } => ExpressionKind::Index {
            target: t.expression(rewriter, target),
            index: t.expression(rewriter, index),
        },
        ExpressionKind::Range { start, end } => ExpressionKind::Range {
            start: t.expression(rewriter, start),
            end: t.expression(rewriter, end),
        },
        ExpressionKind::Binary { op, left, right } => ExpressionKind::Binary {
            op: *op,
            left: t.expression(rewriter, left),
            right: t.expression(rewriter, right),
        },
        ExpressionKind::Filter(filter) => ExpressionKind::Filter(FilterExpression {
            input: t.expression(rewriter, &filter.input),
            name: filter.name.clone(),
            arguments: t.arguments(rewriter, &filter.arguments),
        }),
    };

    if tracker.changed {
        Expression::new(kind, expression.span)
    } else {
        Arc::clone(expression)
    }
}

/// Renames filters throughout a tree.
#[derive(Debug, Default, Clone)]
pub struct FilterSubstitution {
    replacements: HashMap<String, String>,
}

impl FilterSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every use of filter `from` with filter `to`.
    pub fn substitute(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.replacements.insert(from.into(), to.into());
        self
    }
}

impl Rewriter for FilterSubstitution {
    fn rewrite_expression(&mut self, expression: &Arc<Expression>) -> Arc<Expression> {
        let rewritten = rewrite_expression_children(self, expression);
        let ExpressionKind::Filter(filter) = &rewritten.kind else {
            return rewritten;
        };
        match self.replacements.get(&filter.name) {
            Some(replacement) => Expression::new(
                ExpressionKind::Filter(FilterExpression {
                    input: Arc::clone(&filter.input),
                    name: replacement.clone(),
                    arguments: filter.arguments.clone(),
                }),
                rewritten.span,
            ),
            None => rewritten,
        }
    }
}

/// Turns `{{ x | raw }}` into an unencoded output of `x`.
///
/// Only a trailing `raw` filter on an output statement is lifted; anywhere
/// else `raw` stays in the pipeline and acts as the identity filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawOutputRewriter;

impl Rewriter for RawOutputRewriter {
    fn rewrite_statement(&mut self, statement: &Arc<Statement>) -> Arc<Statement> {
        let rewritten = rewrite_statement_children(self, statement);
        let StatementKind::Output(output) = &rewritten.kind else {
            return rewritten;
        };
        match &output.expression.kind {
            ExpressionKind::Filter(filter) if filter.name == "raw" && filter.arguments.is_empty() => Statement::new(
                StatementKind::Output(OutputStatement {
                    expression: Arc::clone(&filter.input),
                    encode: false,
                }),
                rewritten.span,
            ),
            _ => rewritten,
        }
    }
}
