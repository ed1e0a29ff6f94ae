/*
 * ast/visitor.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Read-only AST traversal.
//!
//! Override `visit_*` methods to observe specific node types and call the
//! matching `walk_*` function to keep descending. Statement sequences are
//! walked pre-order, left to right; children of a node are visited in source
//! order.

use super::{
    Block, CustomStatement, Expression, ExpressionKind, FilterExpression, ForStatement,
    IncludeStatement, OutputStatement, Statement, StatementKind, TagArgument,
};

pub trait Visitor<'ast> {
    fn visit_block(&mut self, block: &'ast Block) {
        walk_block(self, block);
    }

    fn visit_statement(&mut self, statement: &'ast Statement) {
        walk_statement(self, statement);
    }

    fn visit_expression(&mut self, expression: &'ast Expression) {
        walk_expression(self, expression);
    }

    fn visit_text(&mut self, _statement: &'ast Statement, _text: &'ast str) {}

    fn visit_output(&mut self, _statement: &'ast Statement, output: &'ast OutputStatement) {
        self.visit_expression(&output.expression);
    }

    fn visit_for(&mut self, statement: &'ast Statement, for_statement: &'ast ForStatement) {
        walk_for(self, statement, for_statement);
    }

    fn visit_include(&mut self, _statement: &'ast Statement, include: &'ast IncludeStatement) {
        walk_include(self, include);
    }

    fn visit_custom(&mut self, _statement: &'ast Statement, custom: &'ast CustomStatement) {
        walk_custom(self, custom);
    }

    fn visit_filter(&mut self, _expression: &'ast Expression, filter: &'ast FilterExpression) {
        walk_filter(self, filter);
    }

    fn visit_variable(&mut self, _expression: &'ast Expression, _name: &'ast str) {}
}

pub fn walk_block<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, block: &'ast Block) {
    for statement in block {
        visitor.visit_statement(statement);
    }
}

fn walk_optional_block<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, block: &'ast Option<Block>) {
    if let Some(block) = block {
        visitor.visit_block(block);
    }
}

pub fn walk_statement<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, statement: &'ast Statement) {
    match &statement.kind {
        StatementKind::Text(text) => visitor.visit_text(statement, text),
        StatementKind::Output(output) => visitor.visit_output(statement, output),
        StatementKind::Assign(assign) => visitor.visit_expression(&assign.value),
        StatementKind::Capture(capture) => visitor.visit_block(&capture.body),
        StatementKind::If(if_statement) => {
            for branch in &if_statement.branches {
                visitor.visit_expression(&branch.condition);
                visitor.visit_block(&branch.body);
            }
            walk_optional_block(visitor, &if_statement.else_body);
        }
        StatementKind::Unless(unless) => {
            visitor.visit_expression(&unless.condition);
            visitor.visit_block(&unless.body);
            for branch in &unless.branches {
                visitor.visit_expression(&branch.condition);
                visitor.visit_block(&branch.body);
            }
            walk_optional_block(visitor, &unless.else_body);
        }
        StatementKind::Case(case) => {
            visitor.visit_expression(&case.subject);
            for when in &case.whens {
                for value in &when.values {
                    visitor.visit_expression(value);
                }
                visitor.visit_block(&when.body);
            }
            walk_optional_block(visitor, &case.else_body);
        }
        StatementKind::For(for_statement) => visitor.visit_for(statement, for_statement),
        StatementKind::Cycle(cycle) => {
            if let Some(group) = &cycle.group {
                visitor.visit_expression(group);
            }
            for value in &cycle.values {
                visitor.visit_expression(value);
            }
        }
        StatementKind::Include(include) => visitor.visit_include(statement, include),
        StatementKind::Custom(custom) => visitor.visit_custom(statement, custom),
        StatementKind::Break
        | StatementKind::Continue
        | StatementKind::Comment(_)
        | StatementKind::Raw(_)
        | StatementKind::Increment(_)
        | StatementKind::Decrement(_)
        | StatementKind::RenderBody => {}
    }
}

pub fn walk_for<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    _statement: &'ast Statement,
    for_statement: &'ast ForStatement,
) {
    visitor.visit_expression(&for_statement.source);
    if let Some(limit) = &for_statement.limit {
        visitor.visit_expression(limit);
    }
    if let Some(offset) = &for_statement.offset {
        visitor.visit_expression(offset);
    }
    visitor.visit_block(&for_statement.body);
    walk_optional_block(visitor, &for_statement.else_body);
}

pub fn walk_include<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, include: &'ast IncludeStatement) {
    visitor.visit_expression(&include.template);
    if let Some(with_value) = &include.with_value {
        visitor.visit_expression(with_value);
    }
    for argument in &include.arguments {
        visitor.visit_expression(&argument.value);
    }
}

pub fn walk_custom<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, custom: &'ast CustomStatement) {
    match &custom.argument {
        TagArgument::None | TagArgument::Identifier(_) => {}
        TagArgument::Expression(expression) => visitor.visit_expression(expression),
        TagArgument::Arguments(arguments) => {
            for argument in arguments {
                visitor.visit_expression(&argument.value);
            }
        }
    }
    walk_optional_block(visitor, &custom.body);
}

pub fn walk_expression<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, expression: &'ast Expression) {
    match &expression.kind {
        ExpressionKind::Literal(_) => {}
        ExpressionKind::Variable(name) => visitor.visit_variable(expression, name),
        ExpressionKind::Member { target, .. } => visitor.visit_expression(target),
        ExpressionKind::Index { target, index } => {
            visitor.visit_expression(target);
            visitor.visit_expression(index);
        }
        ExpressionKind::Range { start, end } => {
            visitor.visit_expression(start);
            visitor.visit_expression(end);
        }
        ExpressionKind::Binary { left, right, .. } => {
            visitor.visit_expression(left);
            visitor.visit_expression(right);
        }
        ExpressionKind::Filter(filter) => visitor.visit_filter(expression, filter),
    }
}

pub fn walk_filter<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, filter: &'ast FilterExpression) {
    visitor.visit_expression(&filter.input);
    for argument in &filter.arguments {
        visitor.visit_expression(&argument.value);
    }
}
