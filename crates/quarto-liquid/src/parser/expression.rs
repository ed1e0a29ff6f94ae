/*
 * parser/expression.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression tokens and the precedence-climbing expression parser.
//!
//! Precedence, loosest first: filters (`|`), `or`, `and`, comparisons
//! (`== != <> < <= > >= contains startswith endswith`), `+ -`, `* / %`,
//! then member access, indexing and primaries. Binary operators are
//! left-associative.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::ast::{BinaryOp, Expression, ExpressionKind, FilterArgument, FilterExpression, Span};
use crate::value::{Value, parse_decimal};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Str(String),
    Num(Decimal),
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Colon,
    Comma,
    Assign,
    Op(BinaryOp),
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(name) => format!("'{}'", name),
            Tok::Str(s) => format!("string '{}'", s),
            Tok::Num(n) => format!("number {}", n),
            Tok::Dot => "'.'".to_string(),
            Tok::DotDot => "'..'".to_string(),
            Tok::LBracket => "'['".to_string(),
            Tok::RBracket => "']'".to_string(),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::Pipe => "'|'".to_string(),
            Tok::Colon => "':'".to_string(),
            Tok::Comma => "','".to_string(),
            Tok::Assign => "'='".to_string(),
            Tok::Op(op) => format!("'{}'", op.symbol()),
        }
    }

    /// Whether a following `-` is binary.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Tok::Ident(_) | Tok::Str(_) | Tok::Num(_) | Tok::RBracket | Tok::RParen
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub tok: Tok,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

pub(crate) type SyntaxResult<T> = Result<T, SyntaxError>;

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Tokenize `text`, which starts at byte `base` of the template source.
pub(crate) fn tokenize(text: &str, base: usize) -> SyntaxResult<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let negative_number = c == b'-'
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
            && !tokens.last().is_some_and(|t| t.tok.ends_operand());

        let tok = if is_ident_start(c) {
            i += 1;
            loop {
                match bytes.get(i) {
                    Some(&b) if is_ident_continue(b) => i += 1,
                    // a hyphen belongs to the name only when a letter follows
                    Some(b'-') if bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) => i += 1,
                    Some(b'?') => {
                        i += 1;
                        break;
                    }
                    _ => break,
                }
            }
            Tok::Ident(text[start..i].to_string())
        } else if c.is_ascii_digit() || negative_number {
            i += 1;
            while bytes.get(i).is_some_and(u8::is_ascii_digit) {
                i += 1;
            }
            if bytes.get(i) == Some(&b'.') && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                i += 1;
                while bytes.get(i).is_some_and(u8::is_ascii_digit) {
                    i += 1;
                }
            }
            let literal = &text[start..i];
            let number = parse_decimal(literal).ok_or_else(|| {
                SyntaxError::new(
                    format!("Invalid number '{}'", literal),
                    Span::new(base + start, base + i),
                )
            })?;
            Tok::Num(number)
        } else if c == b'"' || c == b'\'' {
            let close = text[i + 1..].find(c as char).ok_or_else(|| {
                SyntaxError::new("Unterminated string literal", Span::new(base + start, base + text.len()))
            })?;
            let content = &text[i + 1..i + 1 + close];
            i += close + 2;
            Tok::Str(content.to_string())
        } else {
            let two = bytes.get(i..i + 2);
            let (tok, len) = match (two, c) {
                (Some(b".."), _) => (Tok::DotDot, 2),
                (Some(b"=="), _) => (Tok::Op(BinaryOp::Equal), 2),
                (Some(b"!="), _) | (Some(b"<>"), _) => (Tok::Op(BinaryOp::NotEqual), 2),
                (Some(b"<="), _) => (Tok::Op(BinaryOp::LessOrEqual), 2),
                (Some(b">="), _) => (Tok::Op(BinaryOp::GreaterOrEqual), 2),
                (_, b'<') => (Tok::Op(BinaryOp::Less), 1),
                (_, b'>') => (Tok::Op(BinaryOp::Greater), 1),
                (_, b'+') => (Tok::Op(BinaryOp::Add), 1),
                (_, b'-') => (Tok::Op(BinaryOp::Subtract), 1),
                (_, b'*') => (Tok::Op(BinaryOp::Multiply), 1),
                (_, b'/') => (Tok::Op(BinaryOp::Divide), 1),
                (_, b'%') => (Tok::Op(BinaryOp::Modulo), 1),
                (_, b'=') => (Tok::Assign, 1),
                (_, b'.') => (Tok::Dot, 1),
                (_, b'[') => (Tok::LBracket, 1),
                (_, b']') => (Tok::RBracket, 1),
                (_, b'(') => (Tok::LParen, 1),
                (_, b')') => (Tok::RParen, 1),
                (_, b'|') => (Tok::Pipe, 1),
                (_, b':') => (Tok::Colon, 1),
                (_, b',') => (Tok::Comma, 1),
                _ => {
                    let ch = text[i..].chars().next().unwrap_or('?');
                    return Err(SyntaxError::new(
                        format!("Unexpected character '{}'", ch),
                        Span::new(base + i, base + i + ch.len_utf8()),
                    ));
                }
            };
            i += len;
            tok
        };
        tokens.push(Token {
            tok,
            span: Span::new(base + start, base + i),
        });
    }
    Ok(tokens)
}

/// Deepest nesting of parentheses, indexes and filter arguments accepted in
/// one expression.
pub(crate) const MAX_EXPRESSION_DEPTH: usize = 256;

/// Cursor over the tokens of one tag or output.
pub(crate) struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Span reported for errors at the end of input.
    end: Span,
}

impl TokenStream {
    pub fn new(text: &str, base: usize) -> SyntaxResult<Self> {
        let end = base + text.trim_end().len();
        Ok(Self {
            tokens: tokenize(text, base)?,
            pos: 0,
            depth: 0,
            end: Span::new(end, end),
        })
    }

    pub fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn peek_span(&self) -> Span {
        self.tokens.get(self.pos).map_or(self.end, |t| t.span)
    }

    fn previous_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(self.end, |t| t.span)
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the identifier `keyword`.
    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Whether the next tokens are `name :`.
    pub fn at_named_argument(&self) -> bool {
        matches!(self.peek(), Some(Tok::Ident(_))) && self.peek_at(1) == Some(&Tok::Colon)
    }

    pub fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.peek_span())
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        match self.peek() {
            Some(tok) => self.error_here(format!("Expected {}, found {}", expected, tok.describe())),
            None => self.error_here(format!("Expected {}", expected)),
        }
    }

    pub fn expect(&mut self, tok: &Tok, expected: &str) -> SyntaxResult<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    pub fn expect_identifier(&mut self, expected: &str) -> SyntaxResult<String> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    pub fn expect_end(&self) -> SyntaxResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(self.error_here(format!("Unexpected {}", tok.describe()))),
        }
    }

    fn span_from(&self, start: Span) -> Span {
        start.to(self.previous_span())
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// An expression followed by any number of filters.
    pub fn parse_filtered(&mut self) -> SyntaxResult<Arc<Expression>> {
        let start = self.peek_span();
        let mut expression = self.parse_expression()?;
        while self.eat(&Tok::Pipe) {
            let name = self.expect_identifier("a filter name")?;
            let arguments = if self.eat(&Tok::Colon) {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            expression = Expression::new(
                ExpressionKind::Filter(FilterExpression {
                    input: expression,
                    name,
                    arguments,
                }),
                self.span_from(start),
            );
        }
        Ok(expression)
    }

    /// `a, key: b, ...`
    pub fn parse_arguments(&mut self) -> SyntaxResult<Vec<FilterArgument>> {
        let mut arguments = Vec::new();
        loop {
            let name = if self.at_named_argument() {
                let name = self.expect_identifier("an argument name")?;
                self.pos += 1;
                Some(name)
            } else {
                None
            };
            let value = self.parse_expression()?;
            arguments.push(FilterArgument { name, value });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        Ok(arguments)
    }

    /// An expression without filters.
    pub fn parse_expression(&mut self) -> SyntaxResult<Arc<Expression>> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(self.error_here(format!(
                "Expression nesting too deep (more than {} levels)",
                MAX_EXPRESSION_DEPTH
            )));
        }
        self.depth += 1;
        let expression = self.parse_binary(0);
        self.depth -= 1;
        expression
    }

    fn binary_operator(&self) -> Option<(BinaryOp, u8)> {
        let op = match self.peek()? {
            Tok::Op(op) => *op,
            Tok::Ident(word) => match word.as_str() {
                "or" => BinaryOp::Or,
                "and" => BinaryOp::And,
                "contains" => BinaryOp::Contains,
                "startswith" => BinaryOp::StartsWith,
                "endswith" => BinaryOp::EndsWith,
                _ => return None,
            },
            _ => return None,
        };
        let precedence = match op {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessOrEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterOrEqual
            | BinaryOp::Contains
            | BinaryOp::StartsWith
            | BinaryOp::EndsWith => 3,
            BinaryOp::Add | BinaryOp::Subtract => 4,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 5,
        };
        Some((op, precedence))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> SyntaxResult<Arc<Expression>> {
        let mut left = self.parse_postfix()?;
        while let Some((op, precedence)) = self.binary_operator() {
            if precedence <= min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.parse_binary(precedence)?;
            let span = left.span.to(right.span);
            left = Expression::new(ExpressionKind::Binary { op, left, right }, span);
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> SyntaxResult<Arc<Expression>> {
        let start = self.peek_span();
        let mut expression = self.parse_primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                let name = self.expect_identifier("a member name after '.'")?;
                expression = Expression::new(
                    ExpressionKind::Member {
                        target: expression,
                        name,
                    },
                    self.span_from(start),
                );
            } else if self.eat(&Tok::LBracket) {
                let index = self.parse_expression()?;
                self.expect(&Tok::RBracket, "']'")?;
                expression = Expression::new(
                    ExpressionKind::Index {
                        target: expression,
                        index,
                    },
                    self.span_from(start),
                );
            } else {
                return Ok(expression);
            }
        }
    }

    fn parse_primary(&mut self) -> SyntaxResult<Arc<Expression>> {
        let Some(token) = self.advance() else {
            return Err(self.unexpected("an expression"));
        };
        let kind = match token.tok {
            Tok::Str(s) => ExpressionKind::Literal(Value::from(s)),
            Tok::Num(n) => ExpressionKind::Literal(Value::Number(n)),
            Tok::Ident(name) => match name.as_str() {
                "true" => ExpressionKind::Literal(Value::Boolean(true)),
                "false" => ExpressionKind::Literal(Value::Boolean(false)),
                "nil" | "null" => ExpressionKind::Literal(Value::Nil),
                "empty" => ExpressionKind::Literal(Value::Empty),
                "blank" => ExpressionKind::Literal(Value::Blank),
                _ => ExpressionKind::Variable(name),
            },
            Tok::LParen => {
                let first = self.parse_expression()?;
                if self.eat(&Tok::DotDot) {
                    let end = self.parse_expression()?;
                    self.expect(&Tok::RParen, "')'")?;
                    return Ok(Expression::new(
                        ExpressionKind::Range { start: first, end },
                        self.span_from(token.span),
                    ));
                }
                self.expect(&Tok::RParen, "')' or '..'")?;
                return Ok(first);
            }
            other => {
                self.pos -= 1;
                return Err(SyntaxError::new(
                    format!("Expected an expression, found {}", other.describe()),
                    token.span,
                ));
            }
        };
        Ok(Expression::new(kind, token.span))
    }
}

/// Parse a complete expression with filters, as found in `{{ }}`.
pub(crate) fn parse_output(text: &str, base: usize) -> SyntaxResult<Arc<Expression>> {
    let mut stream = TokenStream::new(text, base)?;
    if stream.is_done() {
        return Err(stream.error_here("Expected an expression"));
    }
    let expression = stream.parse_filtered()?;
    stream.expect_end()?;
    Ok(expression)
}
