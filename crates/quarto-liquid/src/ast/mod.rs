/*
 * ast/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! Statements execute for effect, expressions evaluate to a [`Value`]. Nodes
//! are immutable and reference-counted so that a parsed template can be shared
//! between threads and so that rewrites can reuse untouched subtrees.
//!
//! Every node carries a [`NodeId`] that is unique for the lifetime of the
//! process. The compiler memoizes lowered code by id, which means a subtree
//! shared by two parents is only lowered once.

pub mod rewriter;
pub mod visitor;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::tags::CustomTag;
use crate::value::Value;

pub use rewriter::{FilterSubstitution, RawOutputRewriter, Rewriter};
pub use visitor::Visitor;

/// Stable identity of an AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

impl NodeId {
    /// Allocate a fresh id.
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// Byte range in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A sequence of statements, executed in order.
pub type Block = Vec<Arc<Statement>>;

/// A statement node.
#[derive(Debug, Clone)]
pub struct Statement {
    pub id: NodeId,
    pub span: Span,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::fresh(),
            span,
            kind,
        })
    }

    /// Name of the node type, used in compiler errors.
    pub fn type_name(&self) -> String {
        let name = match &self.kind {
            StatementKind::Text(_) => "TextStatement",
            StatementKind::Output(_) => "OutputStatement",
            StatementKind::Assign(_) => "AssignStatement",
            StatementKind::Capture(_) => "CaptureStatement",
            StatementKind::If(_) => "IfStatement",
            StatementKind::Unless(_) => "UnlessStatement",
            StatementKind::Case(_) => "CaseStatement",
            StatementKind::For(_) => "ForStatement",
            StatementKind::Break => "BreakStatement",
            StatementKind::Continue => "ContinueStatement",
            StatementKind::Comment(_) => "CommentStatement",
            StatementKind::Raw(_) => "RawStatement",
            StatementKind::Cycle(_) => "CycleStatement",
            StatementKind::Increment(_) => "IncrementStatement",
            StatementKind::Decrement(_) => "DecrementStatement",
            StatementKind::Include(include) => match include.mode {
                IncludeMode::Include => "IncludeStatement",
                IncludeMode::Render => "RenderStatement",
            },
            StatementKind::RenderBody => "RenderBodyStatement",
            StatementKind::Custom(custom) => {
                return format!("CustomTagStatement({})", custom.tag.name());
            }
        };
        name.to_string()
    }
}

/// The statement variants.
#[derive(Debug, Clone)]
pub enum StatementKind {
    /// Literal text between delimiters.
    Text(Arc<str>),

    /// `{{ expression }}` and `{% echo expression %}`.
    Output(OutputStatement),

    /// `{% assign name = expression %}`
    Assign(AssignStatement),

    /// `{% capture name %}...{% endcapture %}`
    Capture(CaptureStatement),

    /// `{% if %}...{% elsif %}...{% else %}...{% endif %}`
    If(IfStatement),

    /// `{% unless %}...{% elsif %}...{% else %}...{% endunless %}`
    Unless(UnlessStatement),

    /// `{% case %}{% when %}...{% else %}...{% endcase %}`
    Case(CaseStatement),

    /// `{% for item in source %}...{% else %}...{% endfor %}`
    For(ForStatement),

    /// `{% break %}`
    Break,

    /// `{% continue %}`
    Continue,

    /// `{% comment %}...{% endcomment %}`; renders nothing.
    Comment(Arc<str>),

    /// `{% raw %}...{% endraw %}`; content written verbatim.
    Raw(Arc<str>),

    /// `{% cycle 'a', 'b' %}` or `{% cycle group: 'a', 'b' %}`
    Cycle(CycleStatement),

    /// `{% increment name %}`
    Increment(String),

    /// `{% decrement name %}`
    Decrement(String),

    /// `{% include 'name' %}` and `{% render 'name' %}`
    Include(IncludeStatement),

    /// `{% renderbody %}` inside a layout.
    RenderBody,

    /// A tag registered by the host.
    Custom(CustomStatement),
}

#[derive(Debug, Clone)]
pub struct OutputStatement {
    pub expression: Arc<Expression>,
    /// When false the value bypasses the output encoder.
    pub encode: bool,
}

#[derive(Debug, Clone)]
pub struct AssignStatement {
    pub name: String,
    pub value: Arc<Expression>,
}

#[derive(Debug, Clone)]
pub struct CaptureStatement {
    pub name: String,
    pub body: Block,
}

/// A condition and the block it guards.
#[derive(Debug, Clone)]
pub struct ConditionalBranch {
    pub condition: Arc<Expression>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    /// The `if` branch followed by every `elsif`.
    pub branches: Vec<ConditionalBranch>,
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct UnlessStatement {
    /// Rendered when the condition is falsy.
    pub condition: Arc<Expression>,
    pub body: Block,
    /// `elsif` branches, with ordinary truthiness.
    pub branches: Vec<ConditionalBranch>,
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct WhenBranch {
    pub values: Vec<Arc<Expression>>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct CaseStatement {
    pub subject: Arc<Expression>,
    pub whens: Vec<WhenBranch>,
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct ForStatement {
    pub variable: String,
    pub source: Arc<Expression>,
    pub limit: Option<Arc<Expression>>,
    pub offset: Option<Arc<Expression>>,
    pub reversed: bool,
    pub body: Block,
    /// Rendered when the loop has no iterations.
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct CycleStatement {
    pub group: Option<Arc<Expression>>,
    pub values: Vec<Arc<Expression>>,
}

/// Whether an included template shares the caller's variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeMode {
    /// `include`: child scope of the caller.
    Include,
    /// `render`: isolated scope, only explicit arguments are visible.
    Render,
}

#[derive(Debug, Clone)]
pub struct IncludeStatement {
    pub mode: IncludeMode,
    pub template: Arc<Expression>,
    /// `with value` binding.
    pub with_value: Option<Arc<Expression>>,
    /// `as alias` name for the `with` binding.
    pub alias: Option<String>,
    pub arguments: Vec<NamedArgument>,
}

#[derive(Debug, Clone)]
pub struct NamedArgument {
    pub name: String,
    pub value: Arc<Expression>,
}

/// The syntax a custom tag consumed, before evaluation.
#[derive(Debug, Clone)]
pub enum TagArgument {
    None,
    Identifier(String),
    Expression(Arc<Expression>),
    Arguments(Vec<FilterArgument>),
}

#[derive(Clone)]
pub struct CustomStatement {
    pub tag: Arc<dyn CustomTag>,
    pub argument: TagArgument,
    pub body: Option<Block>,
}

impl fmt::Debug for CustomStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomStatement")
            .field("tag", &self.tag.name())
            .field("argument", &self.argument)
            .field("body", &self.body)
            .finish()
    }
}

/// An expression node.
#[derive(Debug, Clone)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExpressionKind,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::fresh(),
            span,
            kind,
        })
    }
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    /// String, number, boolean, `nil`, `empty` and `blank` literals.
    Literal(Value),

    /// A top-level variable name.
    Variable(String),

    /// `target.name`
    Member {
        target: Arc<Expression>,
        name: String,
    },

    /// `target[index]`
    Index {
        target: Arc<Expression>,
        index: Arc<Expression>,
    },

    /// `(start..end)`
    Range {
        start: Arc<Expression>,
        end: Arc<Expression>,
    },

    Binary {
        op: BinaryOp,
        left: Arc<Expression>,
        right: Arc<Expression>,
    },

    /// `input | name: arguments`
    Filter(FilterExpression),
}

#[derive(Debug, Clone)]
pub struct FilterExpression {
    pub input: Arc<Expression>,
    pub name: String,
    pub arguments: Vec<FilterArgument>,
}

/// A positional (`name == None`) or named filter argument.
#[derive(Debug, Clone)]
pub struct FilterArgument {
    pub name: Option<String>,
    pub value: Arc<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    And,
    Or,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    /// Source spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::Contains => "contains",
            BinaryOp::StartsWith => "startswith",
            BinaryOp::EndsWith => "endswith",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // NodeId / Span
    // ========================================================================

    #[test]
    fn test_node_ids_are_unique() {
        let a = NodeId::fresh();
        let b = NodeId::fresh();
        assert_ne!(a, b);
        assert!(b.index() > a.index());
    }

    #[test]
    fn test_span_to() {
        let joined = Span::new(4, 8).to(Span::new(1, 6));
        assert_eq!(joined, Span::new(1, 8));
    }

    // ========================================================================
    // Statement type names
    // ========================================================================

    #[test]
    fn test_type_names() {
        let text = Statement::new(StatementKind::Text("x".into()), Span::default());
        assert_eq!(text.type_name(), "TextStatement");

        let include = Statement::new(
            StatementKind::Include(IncludeStatement {
                mode: IncludeMode::Render,
                template: Expression::new(
                    ExpressionKind::Literal(Value::from("card")),
                    Span::default(),
                ),
                with_value: None,
                alias: None,
                arguments: Vec::new(),
            }),
            Span::default(),
        );
        assert_eq!(include.type_name(), "RenderStatement");
    }

    #[test]
    fn test_binary_op_symbols() {
        assert_eq!(BinaryOp::LessOrEqual.symbol(), "<=");
        assert_eq!(BinaryOp::Contains.symbol(), "contains");
    }
}
