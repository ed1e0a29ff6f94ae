/*
 * parser/lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Splits template source into text runs, `{{ }}` outputs and `{% %}` tags.
//!
//! Trim markers are applied here: a `-` next to a delimiter removes the
//! whitespace of the adjacent text run or `raw` body, so later stages never
//! see it.
//! The bodies of `raw` and `comment` are not tokenized.

use memchr::memchr;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::Span;
use crate::diagnostics::{DiagnosticCollector, UNTERMINATED_DELIMITER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    Text,
    Output,
    Tag,
    /// Untokenized body of `raw` or `comment`.
    Verbatim,
}

#[derive(Debug, Clone)]
pub(crate) struct Segment<'s> {
    pub kind: SegmentKind,
    /// Text for text runs, the inner markup (delimiters and trim markers
    /// removed) for outputs and tags.
    pub content: &'s str,
    /// Byte offset of `content` in the source.
    pub content_start: usize,
    /// The whole segment including delimiters.
    pub span: Span,
    trim_before: bool,
    trim_after: bool,
}

impl<'s> Segment<'s> {
    /// Tag name: the first word of a tag's content.
    pub fn tag_name(&self) -> &'s str {
        let trimmed = self.content.trim_start();
        let end = trimmed
            .find(|c: char| c.is_whitespace())
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    }

    /// Tag arguments: the content after the tag name, with its source offset.
    pub fn tag_arguments(&self) -> (&'s str, usize) {
        let name = self.tag_name();
        let leading = self.content.len() - self.content.trim_start().len();
        let offset = leading + name.len();
        (&self.content[offset..], self.content_start + offset)
    }
}

static VERBATIM_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{%-?\s*end(raw|comment)\s*-?%\}").expect("valid regex")
});

pub(crate) fn tokenize<'s>(source: &'s str, diagnostics: &mut DiagnosticCollector<'_>) -> Vec<Segment<'s>> {
    let bytes = source.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(found) = memchr(b'{', &bytes[cursor..]) {
        let open = cursor + found;
        let kind = match bytes.get(open + 1) {
            Some(b'{') => SegmentKind::Output,
            Some(b'%') => SegmentKind::Tag,
            _ => {
                cursor = open + 1;
                continue;
            }
        };
        let closer: &[u8] = if kind == SegmentKind::Output { b"}}" } else { b"%}" };

        let Some(close) = find_closer(bytes, open + 2, closer) else {
            let what = if kind == SegmentKind::Output { "{{" } else { "{%" };
            let expected = if kind == SegmentKind::Output { "}}" } else { "%}" };
            diagnostics.error_with_code(
                UNTERMINATED_DELIMITER,
                format!("Unterminated '{}': expected '{}'", what, expected),
                Span::new(open, source.len()),
            );
            push_text(&mut segments, source, text_start, open);
            text_start = source.len();
            break;
        };

        push_text(&mut segments, source, text_start, open);

        let mut inner_start = open + 2;
        let mut inner_end = close;
        let trim_before = bytes.get(inner_start) == Some(&b'-');
        if trim_before {
            inner_start += 1;
        }
        let trim_after = inner_end > inner_start && bytes[inner_end - 1] == b'-';
        if trim_after {
            inner_end -= 1;
        }
        let end = close + 2;
        let segment = Segment {
            kind,
            content: &source[inner_start..inner_end],
            content_start: inner_start,
            span: Span::new(open, end),
            trim_before,
            trim_after,
        };
        let verbatim = match segment.tag_name() {
            name @ ("raw" | "comment") if kind == SegmentKind::Tag => Some(name),
            _ => None,
        };
        segments.push(segment);
        cursor = end;
        text_start = end;

        if let Some(name) = verbatim {
            // only the end tag of the block that was opened closes it
            let closing = VERBATIM_END
                .captures_iter(&source[end..])
                .find(|captures| &captures[1] == name)
                .and_then(|captures| captures.get(0));
            let (body_end, resume) = match closing {
                Some(m) => (end + m.start(), end + m.start()),
                None => (source.len(), source.len()),
            };
            segments.push(Segment {
                kind: SegmentKind::Verbatim,
                content: &source[end..body_end],
                content_start: end,
                span: Span::new(end, body_end),
                trim_before: false,
                trim_after: false,
            });
            cursor = resume;
            text_start = resume;
        }
    }
    push_text(&mut segments, source, text_start, source.len());

    apply_trim_markers(&mut segments);
    segments
}

/// Position of `closer`, skipping quoted strings.
fn find_closer(bytes: &[u8], from: usize, closer: &[u8]) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if bytes[i..].starts_with(closer) => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn push_text<'s>(segments: &mut Vec<Segment<'s>>, source: &'s str, start: usize, end: usize) {
    if start < end {
        segments.push(Segment {
            kind: SegmentKind::Text,
            content: &source[start..end],
            content_start: start,
            span: Span::new(start, end),
            trim_before: false,
            trim_after: false,
        });
    }
}

/// Trim text runs and verbatim bodies next to a `-` marker.
fn apply_trim_markers(segments: &mut Vec<Segment<'_>>) {
    for i in 0..segments.len() {
        if !matches!(segments[i].kind, SegmentKind::Text | SegmentKind::Verbatim) {
            continue;
        }
        let after_trimming = i > 0 && segments[i - 1].trim_after;
        let before_trimming = segments.get(i + 1).is_some_and(|next| next.trim_before);
        let segment = &mut segments[i];
        if after_trimming {
            let trimmed = segment.content.trim_start();
            segment.content_start += segment.content.len() - trimmed.len();
            segment.content = trimmed;
        }
        if before_trimming {
            segment.content = segment.content.trim_end();
        }
    }
    segments.retain(|s| s.kind != SegmentKind::Text || !s.content.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(SegmentKind, String)> {
        let mut diagnostics = DiagnosticCollector::new(source);
        tokenize(source, &mut diagnostics)
            .into_iter()
            .map(|s| (s.kind, s.content.to_string()))
            .collect()
    }

    #[test]
    fn test_segments() {
        assert_eq!(
            kinds("a {{ x }} b {% if y %}c{% endif %}"),
            vec![
                (SegmentKind::Text, "a ".to_string()),
                (SegmentKind::Output, " x ".to_string()),
                (SegmentKind::Text, " b ".to_string()),
                (SegmentKind::Tag, " if y ".to_string()),
                (SegmentKind::Text, "c".to_string()),
                (SegmentKind::Tag, " endif ".to_string()),
            ]
        );
    }

    #[test]
    fn test_single_braces_are_text() {
        assert_eq!(kinds("{ a } {x"), vec![(SegmentKind::Text, "{ a } {x".to_string())]);
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            kinds("a  \n{{- x -}}\n  b"),
            vec![
                (SegmentKind::Text, "a".to_string()),
                (SegmentKind::Output, " x ".to_string()),
                (SegmentKind::Text, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_closer_inside_string() {
        assert_eq!(
            kinds("{{ '}}' }}"),
            vec![(SegmentKind::Output, " '}}' ".to_string())]
        );
    }

    #[test]
    fn test_raw_body_is_verbatim() {
        let segments = kinds("{% raw %}{{ x }}{% endraw %}");
        assert_eq!(segments[1], (SegmentKind::Verbatim, "{{ x }}".to_string()));
        assert_eq!(segments[2].0, SegmentKind::Tag);
    }

    #[test]
    fn test_verbatim_closes_on_its_own_end_tag() {
        let segments = kinds("{% raw %}a{% endcomment %}b{% endraw %}");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1], (SegmentKind::Verbatim, "a{% endcomment %}b".to_string()));

        let segments = kinds("{% comment %}{%- endraw -%}{% endcomment %}x");
        assert_eq!(segments[1], (SegmentKind::Verbatim, "{%- endraw -%}".to_string()));
        assert_eq!(segments[3], (SegmentKind::Text, "x".to_string()));
    }

    #[test]
    fn test_trim_markers_on_verbatim_body() {
        let segments = kinds("{% raw -%}  x  {%- endraw %}");
        assert_eq!(segments[1], (SegmentKind::Verbatim, "x".to_string()));

        let segments = kinds("{% raw %} x \n{%- endraw %}");
        assert_eq!(segments[1], (SegmentKind::Verbatim, " x".to_string()));
    }

    #[test]
    fn test_unterminated_output() {
        let source = "ab {{ x";
        let mut diagnostics = DiagnosticCollector::new(source);
        let segments = tokenize(source, &mut diagnostics);
        assert_eq!(segments.len(), 1);
        let reported = diagnostics.into_diagnostics();
        assert_eq!(reported[0].code.as_deref(), Some(UNTERMINATED_DELIMITER));
        assert_eq!(reported[0].column, 4);
    }

    #[test]
    fn test_tag_name_and_arguments() {
        let source = "{%  assign x = 1 %}";
        let mut diagnostics = DiagnosticCollector::new(source);
        let segments = tokenize(source, &mut diagnostics);
        assert_eq!(segments[0].tag_name(), "assign");
        let (arguments, offset) = segments[0].tag_arguments();
        assert_eq!(arguments, " x = 1 ");
        assert_eq!(&source[offset..offset + 2], " x");
    }
}
