/*
 * parser/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! Parsing is a single pass over the segments produced by the lexer. Block
//! tags recurse into [`BlockParser::parse_block`] until one of their closing
//! tags; problems are recorded as diagnostics and parsing resumes with the
//! next segment, so one call can report several independent errors.
//!
//! Custom tags registered with [`LiquidParser::register_tag`] are recognized
//! by name and parsed according to their [`TagSyntax`].

mod expression;
mod lexer;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::ast::{
    AssignStatement, Block, CaptureStatement, CaseStatement, ConditionalBranch, CustomStatement,
    CycleStatement, Expression, ForStatement, IfStatement, IncludeMode,
    IncludeStatement, NamedArgument, OutputStatement, RawOutputRewriter, Rewriter, Span, Statement,
    StatementKind, TagArgument, UnlessStatement, WhenBranch,
};
use crate::diagnostics::{
    Diagnostic, DiagnosticCollector, DiagnosticKind, INVALID_SYNTAX, UNCLOSED_BLOCK, UNEXPECTED_TAG,
    UNKNOWN_TAG,
};
use crate::error::ParseErrors;
use crate::tags::{CustomTag, TagSyntax};
use crate::template::Template;

use expression::{SyntaxError, SyntaxResult, Tok, TokenStream};
use lexer::{Segment, SegmentKind};

/// Built-in tags that take a closing `end` tag.
const BLOCK_TAGS: &[&str] = &["if", "unless", "case", "for", "capture", "raw", "comment"];

/// Name used for templates parsed without one.
pub const DEFAULT_TEMPLATE_NAME: &str = "template";

/// The result of a parse: a template (possibly partial) and its diagnostics.
#[derive(Debug)]
pub struct ParseOutcome {
    pub template: Template,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutcome {
    /// True when no error-level diagnostic was produced.
    pub fn is_success(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Error)
    }

    pub fn into_result(self) -> Result<Template, ParseErrors> {
        if self.is_success() {
            Ok(self.template)
        } else {
            Err(ParseErrors::new(
                self.diagnostics,
                self.template.name(),
                self.template.source_arc(),
            ))
        }
    }
}

/// Parses template source. Holds the registered custom tags.
#[derive(Clone, Default)]
pub struct LiquidParser {
    tags: HashMap<String, Arc<dyn CustomTag>>,
}

impl LiquidParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom tag. Must happen before parsing.
    pub fn register_tag(&mut self, tag: Arc<dyn CustomTag>) -> &mut Self {
        self.tags.insert(tag.name().to_string(), tag);
        self
    }

    pub fn tag(&self, name: &str) -> Option<&Arc<dyn CustomTag>> {
        self.tags.get(name)
    }

    pub fn parse(&self, source: &str) -> ParseOutcome {
        self.parse_named(DEFAULT_TEMPLATE_NAME, source)
    }

    /// Parse `source`, naming it `name` in diagnostics.
    pub fn parse_named(&self, name: &str, source: &str) -> ParseOutcome {
        let mut diagnostics = DiagnosticCollector::new(source);
        let segments = lexer::tokenize(source, &mut diagnostics);

        let mut parser = BlockParser {
            parser: self,
            segments,
            pos: 0,
            diagnostics,
        };
        let (statements, _) = parser.parse_block(&[]);
        let statements = RawOutputRewriter.rewrite_block(&statements);
        let diagnostics = parser.diagnostics.into_diagnostics();

        debug!(
            template = name,
            statements = statements.len(),
            diagnostics = diagnostics.len(),
            "parsed template"
        );

        ParseOutcome {
            template: Template::new(name, Arc::from(source), statements),
            diagnostics,
        }
    }
}

impl std::fmt::Debug for LiquidParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tags.keys().collect();
        names.sort();
        f.debug_struct("LiquidParser").field("tags", &names).finish()
    }
}

struct BlockParser<'p, 's> {
    parser: &'p LiquidParser,
    segments: Vec<Segment<'s>>,
    pos: usize,
    diagnostics: DiagnosticCollector<'s>,
}

impl<'s> BlockParser<'_, 's> {
    fn next_segment(&mut self) -> Option<Segment<'s>> {
        let segment = self.segments.get(self.pos).cloned();
        if segment.is_some() {
            self.pos += 1;
        }
        segment
    }

    fn report(&mut self, error: SyntaxError) {
        self.diagnostics
            .error_with_code(INVALID_SYNTAX, error.message, error.span);
    }

    fn report_unclosed(&mut self, name: &str, span: Span) {
        self.diagnostics.error_with_code(
            UNCLOSED_BLOCK,
            format!("'{}' block is never closed; expected '{{% end{} %}}'", name, name),
            span,
        );
    }

    /// Whether `name` only makes sense inside some block.
    fn is_block_delimiter(&self, name: &str) -> bool {
        if matches!(name, "else" | "elsif" | "when") {
            return true;
        }
        name.strip_prefix("end").is_some_and(|opened| {
            BLOCK_TAGS.contains(&opened) || self.parser.tag(opened).is_some_and(|tag| tag.is_block())
        })
    }

    /// Parse statements until one of `closers`. Returns the closing tag, or
    /// `None` at the end of input.
    fn parse_block(&mut self, closers: &[&str]) -> (Block, Option<Segment<'s>>) {
        let mut block = Block::new();
        while let Some(segment) = self.next_segment() {
            match segment.kind {
                SegmentKind::Text | SegmentKind::Verbatim => {
                    block.push(Statement::new(
                        StatementKind::Text(Arc::from(segment.content)),
                        segment.span,
                    ));
                }
                SegmentKind::Output => match expression::parse_output(segment.content, segment.content_start) {
                    Ok(expression) => block.push(Statement::new(
                        StatementKind::Output(OutputStatement {
                            expression,
                            encode: true,
                        }),
                        segment.span,
                    )),
                    Err(error) => self.report(error),
                },
                SegmentKind::Tag => {
                    let name = segment.tag_name();
                    if closers.contains(&name) {
                        return (block, Some(segment));
                    }
                    if let Some(statement) = self.parse_tag(name, &segment) {
                        block.push(statement);
                    }
                }
            }
        }
        (block, None)
    }

    /// Token stream over a tag's arguments.
    fn arguments(&mut self, segment: &Segment<'s>) -> Option<TokenStream> {
        let (text, offset) = segment.tag_arguments();
        match TokenStream::new(text, offset) {
            Ok(stream) => Some(stream),
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    /// Run `parse` over a tag's arguments, reporting any syntax error.
    fn parse_arguments<T>(
        &mut self,
        segment: &Segment<'s>,
        parse: impl FnOnce(&mut TokenStream) -> SyntaxResult<T>,
    ) -> Option<T> {
        let mut stream = self.arguments(segment)?;
        match parse(&mut stream).and_then(|value| stream.expect_end().map(|()| value)) {
            Ok(value) => Some(value),
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    fn parse_condition(&mut self, segment: &Segment<'s>) -> Option<Arc<Expression>> {
        self.parse_arguments(segment, |s| {
            if s.is_done() {
                return Err(s.error_here("Expected a condition"));
            }
            s.parse_filtered()
        })
    }

    fn parse_tag(&mut self, name: &str, segment: &Segment<'s>) -> Option<Arc<Statement>> {
        let span = segment.span;
        let statement = match name {
            "assign" => StatementKind::Assign(self.parse_arguments(segment, |s| {
                let name = s.expect_identifier("a variable name")?;
                s.expect(&Tok::Assign, "'='")?;
                let value = s.parse_filtered()?;
                Ok(AssignStatement { name, value })
            })?),
            "echo" => {
                let expression = self.parse_arguments(segment, |s| s.parse_filtered())?;
                StatementKind::Output(OutputStatement {
                    expression,
                    encode: true,
                })
            }
            "capture" => return self.parse_capture(segment),
            "if" => return self.parse_if(segment),
            "unless" => return self.parse_unless(segment),
            "case" => return self.parse_case(segment),
            "for" => return self.parse_for(segment),
            "raw" | "comment" => return self.parse_verbatim(name, segment),
            "break" | "continue" | "renderbody" => {
                self.parse_arguments(segment, |_| Ok(()))?;
                match name {
                    "break" => StatementKind::Break,
                    "continue" => StatementKind::Continue,
                    _ => StatementKind::RenderBody,
                }
            }
            "increment" | "decrement" => {
                let variable = self.parse_arguments(segment, |s| s.expect_identifier("a counter name"))?;
                if name == "increment" {
                    StatementKind::Increment(variable)
                } else {
                    StatementKind::Decrement(variable)
                }
            }
            "cycle" => StatementKind::Cycle(self.parse_arguments(segment, parse_cycle)?),
            "include" => StatementKind::Include(
                self.parse_arguments(segment, |s| parse_include(s, IncludeMode::Include))?,
            ),
            "render" => StatementKind::Include(
                self.parse_arguments(segment, |s| parse_include(s, IncludeMode::Render))?,
            ),
            _ => {
                if let Some(tag) = self.parser.tag(name).cloned() {
                    return self.parse_custom(tag, segment);
                }
                if self.is_block_delimiter(name) {
                    self.diagnostics.error_with_code(
                        UNEXPECTED_TAG,
                        format!("Unexpected tag '{}'", name),
                        span,
                    );
                } else {
                    self.diagnostics
                        .error_with_code(UNKNOWN_TAG, format!("Unknown tag '{}'", name), span);
                }
                return None;
            }
        };
        Some(Statement::new(statement, span))
    }

    fn parse_capture(&mut self, segment: &Segment<'s>) -> Option<Arc<Statement>> {
        let name = self.parse_arguments(segment, |s| match s.peek() {
            Some(Tok::Str(name)) => {
                let name = name.clone();
                s.parse_expression()?;
                Ok(name)
            }
            _ => s.expect_identifier("a variable name"),
        });
        let (body, closer) = self.parse_block(&["endcapture"]);
        let Some(closer) = closer else {
            self.report_unclosed("capture", segment.span);
            return None;
        };
        Some(Statement::new(
            StatementKind::Capture(CaptureStatement { name: name?, body }),
            segment.span.to(closer.span),
        ))
    }

    /// Shared by `if` and `unless`: branches until `end_name`.
    fn parse_conditional_chain(
        &mut self,
        tag: &str,
        first: Option<Arc<Expression>>,
        segment: &Segment<'s>,
    ) -> Option<(Vec<ConditionalBranch>, Option<Block>, Span)> {
        let end_name = format!("end{}", tag);
        let closers = ["elsif", "else", end_name.as_str()];
        let mut branches = Vec::new();
        let mut failed = first.is_none();
        let mut condition = first;
        loop {
            let (body, closer) = self.parse_block(&closers);
            if let Some(condition) = condition.take() {
                branches.push(ConditionalBranch { condition, body });
            }
            let Some(closer) = closer else {
                self.report_unclosed(tag, segment.span);
                return None;
            };
            match closer.tag_name() {
                "elsif" => {
                    condition = self.parse_condition(&closer);
                    failed |= condition.is_none();
                }
                "else" => {
                    let (body, closer) = self.parse_block(&[end_name.as_str()]);
                    let Some(closer) = closer else {
                        self.report_unclosed(tag, segment.span);
                        return None;
                    };
                    return (!failed).then(|| (branches, Some(body), segment.span.to(closer.span)));
                }
                _ => return (!failed).then(|| (branches, None, segment.span.to(closer.span))),
            }
        }
    }

    fn parse_if(&mut self, segment: &Segment<'s>) -> Option<Arc<Statement>> {
        let condition = self.parse_condition(segment);
        let (branches, else_body, span) = self.parse_conditional_chain("if", condition, segment)?;
        Some(Statement::new(
            StatementKind::If(IfStatement {
                branches,
                else_body,
            }),
            span,
        ))
    }

    fn parse_unless(&mut self, segment: &Segment<'s>) -> Option<Arc<Statement>> {
        let condition = self.parse_condition(segment);
        let (mut branches, else_body, span) = self.parse_conditional_chain("unless", condition, segment)?;
        let first = branches.remove(0);
        Some(Statement::new(
            StatementKind::Unless(UnlessStatement {
                condition: first.condition,
                body: first.body,
                branches,
                else_body,
            }),
            span,
        ))
    }

    fn parse_case(&mut self, segment: &Segment<'s>) -> Option<Arc<Statement>> {
        let subject = self.parse_condition(segment);
        let closers = ["when", "else", "endcase"];
        // text between `case` and the first `when` is ignored
        let (_, mut closer) = self.parse_block(&closers);
        let mut whens = Vec::new();
        let mut else_body = None;
        let mut failed = subject.is_none();

        let end = loop {
            let Some(current) = closer.take() else {
                self.report_unclosed("case", segment.span);
                return None;
            };
            match current.tag_name() {
                "when" => {
                    let values = self.parse_arguments(&current, |s| {
                        let mut values = vec![s.parse_expression()?];
                        while s.eat(&Tok::Comma) || s.eat_keyword("or") {
                            values.push(s.parse_expression()?);
                        }
                        Ok(values)
                    });
                    let (body, next) = self.parse_block(&closers);
                    match values {
                        Some(values) => whens.push(WhenBranch { values, body }),
                        None => failed = true,
                    }
                    closer = next;
                }
                "else" => {
                    let (body, next) = self.parse_block(&["endcase"]);
                    else_body = Some(body);
                    closer = next;
                }
                _ => break current.span,
            }
        };

        if failed {
            return None;
        }
        Some(Statement::new(
            StatementKind::Case(CaseStatement {
                subject: subject?,
                whens,
                else_body,
            }),
            segment.span.to(end),
        ))
    }

    fn parse_for(&mut self, segment: &Segment<'s>) -> Option<Arc<Statement>> {
        let header = self.parse_arguments(segment, |s| {
            let variable = s.expect_identifier("a loop variable")?;
            if !s.eat_keyword("in") {
                return Err(s.error_here("Expected 'in'"));
            }
            let source = s.parse_expression()?;
            let mut limit = None;
            let mut offset = None;
            let mut reversed = false;
            while !s.is_done() {
                s.eat(&Tok::Comma);
                if s.eat_keyword("reversed") {
                    reversed = true;
                } else if s.eat_keyword("limit") {
                    s.expect(&Tok::Colon, "':' after 'limit'")?;
                    limit = Some(s.parse_expression()?);
                } else if s.eat_keyword("offset") {
                    s.expect(&Tok::Colon, "':' after 'offset'")?;
                    offset = Some(s.parse_expression()?);
                } else {
                    return Err(s.error_here("Expected 'limit', 'offset' or 'reversed'"));
                }
            }
            Ok((variable, source, limit, offset, reversed))
        });

        let (body, closer) = self.parse_block(&["else", "endfor"]);
        let Some(mut closer) = closer else {
            self.report_unclosed("for", segment.span);
            return None;
        };
        let mut else_body = None;
        if closer.tag_name() == "else" {
            let (body, next) = self.parse_block(&["endfor"]);
            let Some(next) = next else {
                self.report_unclosed("for", segment.span);
                return None;
            };
            else_body = Some(body);
            closer = next;
        }

        let (variable, source, limit, offset, reversed) = header?;
        Some(Statement::new(
            StatementKind::For(ForStatement {
                variable,
                source,
                limit,
                offset,
                reversed,
                body,
                else_body,
            }),
            segment.span.to(closer.span),
        ))
    }

    /// `raw` and `comment`: the lexer left their body as one verbatim segment.
    fn parse_verbatim(&mut self, name: &str, segment: &Segment<'s>) -> Option<Arc<Statement>> {
        let body = match self.segments.get(self.pos) {
            Some(next) if next.kind == SegmentKind::Verbatim => {
                self.pos += 1;
                Arc::from(next.content)
            }
            _ => Arc::from(""),
        };
        let end_name = format!("end{}", name);
        let closer = match self.segments.get(self.pos) {
            Some(next) if next.kind == SegmentKind::Tag && next.tag_name() == end_name => {
                self.pos += 1;
                next.span
            }
            _ => {
                self.report_unclosed(name, segment.span);
                return None;
            }
        };
        let kind = if name == "raw" {
            StatementKind::Raw(body)
        } else {
            StatementKind::Comment(body)
        };
        Some(Statement::new(kind, segment.span.to(closer)))
    }

    fn parse_custom(&mut self, tag: Arc<dyn CustomTag>, segment: &Segment<'s>) -> Option<Arc<Statement>> {
        let argument = self.parse_arguments(segment, |s| match tag.syntax() {
            TagSyntax::Empty => Ok(TagArgument::None),
            TagSyntax::Identifier => s.expect_identifier("an identifier").map(TagArgument::Identifier),
            TagSyntax::Expression => s.parse_filtered().map(TagArgument::Expression),
            TagSyntax::Arguments if s.is_done() => Ok(TagArgument::Arguments(Vec::new())),
            TagSyntax::Arguments => s.parse_arguments().map(TagArgument::Arguments),
        });

        let mut span = segment.span;
        let body = if tag.is_block() {
            let end_name = format!("end{}", tag.name());
            let (body, closer) = self.parse_block(&[end_name.as_str()]);
            let Some(closer) = closer else {
                self.report_unclosed(tag.name(), segment.span);
                return None;
            };
            span = span.to(closer.span);
            Some(body)
        } else {
            None
        };

        Some(Statement::new(
            StatementKind::Custom(CustomStatement {
                tag,
                argument: argument?,
                body,
            }),
            span,
        ))
    }
}

/// `[group:] value, value, ...`
fn parse_cycle(s: &mut TokenStream) -> SyntaxResult<CycleStatement> {
    let first = s.parse_expression()?;
    let (group, mut values) = if s.eat(&Tok::Colon) {
        (Some(first), vec![s.parse_expression()?])
    } else {
        (None, vec![first])
    };
    while s.eat(&Tok::Comma) {
        values.push(s.parse_expression()?);
    }
    Ok(CycleStatement { group, values })
}

/// `'name' [with value [as alias]] [,] [key: value, ...]`
fn parse_include(s: &mut TokenStream, mode: IncludeMode) -> SyntaxResult<IncludeStatement> {
    if s.is_done() {
        return Err(s.error_here("Expected a template name"));
    }
    let template = s.parse_expression()?;
    let mut with_value = None;
    let mut alias = None;
    if s.eat_keyword("with") {
        with_value = Some(s.parse_expression()?);
        if s.eat_keyword("as") {
            alias = Some(s.expect_identifier("an alias after 'as'")?);
        }
    }
    let mut arguments = Vec::new();
    loop {
        s.eat(&Tok::Comma);
        if s.is_done() {
            break;
        }
        if !s.at_named_argument() {
            return Err(s.error_here("Expected a named argument"));
        }
        let name = s.expect_identifier("an argument name")?;
        s.expect(&Tok::Colon, "':'")?;
        let value = s.parse_expression()?;
        arguments.push(NamedArgument { name, value });
    }
    Ok(IncludeStatement {
        mode,
        template,
        with_value,
        alias,
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::UNTERMINATED_DELIMITER;
    use pretty_assertions::assert_eq;

    fn codes(source: &str) -> Vec<String> {
        LiquidParser::new()
            .parse(source)
            .diagnostics
            .into_iter()
            .filter_map(|d| d.code)
            .collect()
    }

    fn kinds(source: &str) -> Vec<String> {
        LiquidParser::new()
            .parse(source)
            .into_result()
            .unwrap()
            .statements
            .iter()
            .map(|s| s.type_name())
            .collect()
    }

    // ========================================================================
    // Statements
    // ========================================================================

    #[test]
    fn test_statement_kinds() {
        assert_eq!(
            kinds("a{{ b }}{% assign c = 1 %}{% if c %}{% endif %}{% for i in x %}{% endfor %}"),
            vec![
                "TextStatement",
                "OutputStatement",
                "AssignStatement",
                "IfStatement",
                "ForStatement"
            ]
        );
    }

    #[test]
    fn test_if_branches() {
        let template = LiquidParser::new()
            .parse("{% if a %}1{% elsif b %}2{% elsif c %}3{% else %}4{% endif %}")
            .into_result()
            .unwrap();
        let StatementKind::If(statement) = &template.statements[0].kind else {
            panic!("expected if");
        };
        assert_eq!(statement.branches.len(), 3);
        assert!(statement.else_body.is_some());
    }

    #[test]
    fn test_for_options() {
        let template = LiquidParser::new()
            .parse("{% for i in (1..5) reversed limit: 2 offset: 1 %}{% else %}none{% endfor %}")
            .into_result()
            .unwrap();
        let StatementKind::For(statement) = &template.statements[0].kind else {
            panic!("expected for");
        };
        assert!(statement.reversed);
        assert!(statement.limit.is_some());
        assert!(statement.offset.is_some());
        assert_eq!(statement.else_body.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_case_when_lists() {
        let template = LiquidParser::new()
            .parse("{% case x %} {% when 1, 2 %}a{% when 3 or 4 %}b{% else %}c{% endcase %}")
            .into_result()
            .unwrap();
        let StatementKind::Case(statement) = &template.statements[0].kind else {
            panic!("expected case");
        };
        assert_eq!(statement.whens.len(), 2);
        assert_eq!(statement.whens[1].values.len(), 2);
        assert!(statement.else_body.is_some());
    }

    #[test]
    fn test_include_arguments() {
        let template = LiquidParser::new()
            .parse("{% render 'card' with product as item, size: 2 %}")
            .into_result()
            .unwrap();
        let StatementKind::Include(statement) = &template.statements[0].kind else {
            panic!("expected include");
        };
        assert_eq!(statement.mode, IncludeMode::Render);
        assert_eq!(statement.alias.as_deref(), Some("item"));
        assert_eq!(statement.arguments[0].name, "size");
    }

    #[test]
    fn test_raw_and_comment_keep_markup() {
        let template = LiquidParser::new()
            .parse("{% raw %}{{ x }}{% endraw %}{% comment %}{% bogus %}{% endcomment %}")
            .into_result()
            .unwrap();
        assert!(matches!(&template.statements[0].kind, StatementKind::Raw(body) if &**body == "{{ x }}"));
        assert!(matches!(&template.statements[1].kind, StatementKind::Comment(_)));
    }

    #[test]
    fn test_raw_filter_lifted_at_parse_time() {
        let template = LiquidParser::new().parse("{{ x | raw }}").into_result().unwrap();
        let StatementKind::Output(output) = &template.statements[0].kind else {
            panic!("expected output");
        };
        assert!(!output.encode);
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    #[test]
    fn test_unknown_and_unexpected_tags() {
        assert_eq!(codes("{% bogus %}"), vec![UNKNOWN_TAG]);
        assert_eq!(codes("{% endif %}"), vec![UNEXPECTED_TAG]);
        assert_eq!(codes("{% else %}"), vec![UNEXPECTED_TAG]);
    }

    #[test]
    fn test_unclosed_block() {
        let outcome = LiquidParser::new().parse("a\n{% if x %}b");
        assert!(!outcome.is_success());
        let diagnostic = &outcome.diagnostics[0];
        assert_eq!(diagnostic.code.as_deref(), Some(UNCLOSED_BLOCK));
        assert_eq!((diagnostic.line, diagnostic.column), (2, 1));
        assert_eq!(
            diagnostic.message,
            "'if' block is never closed; expected '{% endif %}'"
        );
    }

    #[test]
    fn test_multiple_independent_errors() {
        assert_eq!(
            codes("{{ a | }}\n{% bogus %}\n{% assign = 1 %}\n{{ b"),
            vec![INVALID_SYNTAX, UNKNOWN_TAG, INVALID_SYNTAX, UNTERMINATED_DELIMITER]
        );
    }

    #[test]
    fn test_bad_condition_does_not_cascade() {
        // the endif still closes the block even though the condition is invalid
        assert_eq!(codes("{% if %}x{% endif %}"), vec![INVALID_SYNTAX]);
        assert_eq!(codes("{% for x items %}{% endfor %}"), vec![INVALID_SYNTAX]);
    }

    #[test]
    fn test_parse_errors_display() {
        let err = LiquidParser::new()
            .parse_named("page.liquid", "{% bogus %}")
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "page.liquid:1:1: [L-1-2] Unknown tag 'bogus'");
    }
}
