/*
 * filters/string.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! String filters.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{FilterArguments, FilterRegistry, required};
use crate::context::TemplateContext;
use crate::error::{RenderError, RenderResult};
use crate::output::{HtmlEncoder, TextEncoder};
use crate::value::Value;

pub(super) fn register(registry: &mut FilterRegistry) {
    registry
        .register("append", append)
        .register("prepend", prepend)
        .register("capitalize", capitalize)
        .register("downcase", downcase)
        .register("upcase", upcase)
        .register("lstrip", lstrip)
        .register("rstrip", rstrip)
        .register("strip", strip)
        .register("strip_newlines", strip_newlines)
        .register("newline_to_br", newline_to_br)
        .register("remove", remove)
        .register("remove_first", remove_first)
        .register("remove_last", remove_last)
        .register("replace", replace)
        .register("replace_first", replace_first)
        .register("replace_last", replace_last)
        .register("slice", slice)
        .register("split", split)
        .register("strip_html", strip_html)
        .register("truncate", truncate)
        .register("truncatewords", truncatewords)
        .register("escape", escape)
        .register("escape_once", escape_once)
        .register("url_encode", url_encode)
        .register("url_decode", url_decode)
        .register("base64_encode", base64_encode)
        .register("base64_decode", base64_decode);
}

fn append(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let suffix = required("append", args, 0, "string")?;
    Ok(Value::from(format!("{}{}", input, suffix)))
}

fn prepend(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let prefix = required("prepend", args, 0, "string")?;
    Ok(Value::from(format!("{}{}", prefix, input)))
}

fn capitalize(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text = input.to_string();
    let mut chars = text.chars();
    Ok(match chars.next() {
        Some(first) => Value::from(first.to_uppercase().chain(chars).collect::<String>()),
        None => Value::from(""),
    })
}

fn downcase(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.to_string().to_lowercase()))
}

fn upcase(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.to_string().to_uppercase()))
}

fn lstrip(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.to_string().trim_start()))
}

fn rstrip(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.to_string().trim_end()))
}

fn strip(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.to_string().trim()))
}

fn strip_newlines(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text: String = input
        .to_string()
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect();
    Ok(Value::from(text))
}

fn newline_to_br(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(
        input.to_string().replace("\r\n", "\n").replace('\n', "<br />\n"),
    ))
}

fn remove(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let needle = required("remove", args, 0, "string")?.to_string();
    Ok(Value::from(input.to_string().replace(&needle, "")))
}

fn remove_first(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let needle = required("remove_first", args, 0, "string")?.to_string();
    Ok(Value::from(input.to_string().replacen(&needle, "", 1)))
}

fn remove_last(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let needle = required("remove_last", args, 0, "string")?.to_string();
    Ok(Value::from(replace_last_occurrence(&input.to_string(), &needle, "")))
}

fn replace(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let needle = required("replace", args, 0, "string")?.to_string();
    let replacement = args.at(1).to_string();
    Ok(Value::from(input.to_string().replace(&needle, &replacement)))
}

fn replace_first(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let needle = required("replace_first", args, 0, "string")?.to_string();
    let replacement = args.at(1).to_string();
    Ok(Value::from(input.to_string().replacen(&needle, &replacement, 1)))
}

fn replace_last(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let needle = required("replace_last", args, 0, "string")?.to_string();
    let replacement = args.at(1).to_string();
    Ok(Value::from(replace_last_occurrence(
        &input.to_string(),
        &needle,
        &replacement,
    )))
}

fn replace_last_occurrence(text: &str, needle: &str, replacement: &str) -> String {
    match text.rfind(needle) {
        Some(index) if !needle.is_empty() => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..index]);
            out.push_str(replacement);
            out.push_str(&text[index + needle.len()..]);
            out
        }
        _ => text.to_string(),
    }
}

/// `slice: start, length` on strings (by character) and arrays.
fn slice(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let start = required("slice", args, 0, "number")?.to_integer();
    let length = if args.at(1).is_nil() { 1 } else { args.at(1).to_integer() };

    let window = |len: usize| -> (usize, usize) {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let from = if start < 0 { (len + start).max(0) } else { start.min(len) };
        let to = from.saturating_add(length.max(0)).min(len);
        (
            usize::try_from(from).unwrap_or(0),
            usize::try_from(to).unwrap_or(0),
        )
    };

    Ok(match &input {
        Value::Array(items) => {
            let (from, to) = window(items.len());
            Value::array(items[from..to].iter().cloned())
        }
        other => {
            let chars: Vec<char> = other.to_string().chars().collect();
            let (from, to) = window(chars.len());
            Value::from(chars[from..to].iter().collect::<String>())
        }
    })
}

/// Trailing empty segments are dropped.
fn split(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text = input.to_string();
    let separator = args.at(0).to_string();
    if text.is_empty() {
        return Ok(Value::array([]));
    }
    let mut parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(Value::from).collect()
    } else {
        text.split(separator.as_str()).map(Value::from).collect()
    };
    while parts.last().is_some_and(|p| p.as_str() == Some("")) {
        parts.pop();
    }
    Ok(Value::from(parts))
}

static HTML_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<!--.*?-->").expect("valid regex")
});
static HTML_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

fn strip_html(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text = input.to_string();
    let without_blocks = HTML_BLOCKS.replace_all(&text, "");
    Ok(Value::from(HTML_TAGS.replace_all(&without_blocks, "").into_owned()))
}

fn truncate(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text = input.to_string();
    let length = if args.at(0).is_nil() { 50 } else { args.at(0).to_integer().max(0) };
    let ellipsis = if args.at(1).is_nil() {
        "...".to_string()
    } else {
        args.at(1).to_string()
    };

    let length = usize::try_from(length).unwrap_or(usize::MAX);
    if text.chars().count() <= length {
        return Ok(Value::from(text));
    }
    let keep = length.saturating_sub(ellipsis.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&ellipsis);
    Ok(Value::from(out))
}

fn truncatewords(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text = input.to_string();
    let count = if args.at(0).is_nil() { 15 } else { args.at(0).to_integer().max(1) };
    let ellipsis = if args.at(1).is_nil() {
        "...".to_string()
    } else {
        args.at(1).to_string()
    };

    let count = usize::try_from(count).unwrap_or(usize::MAX);
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= count {
        return Ok(Value::from(text));
    }
    let mut out = words[..count].join(" ");
    out.push_str(&ellipsis);
    Ok(Value::from(out))
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // writing into a String cannot fail
    let _ = HtmlEncoder.encode(text, &mut out);
    out
}

fn escape(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    if input.is_nil() {
        return Ok(Value::Nil);
    }
    Ok(Value::from(html_escape(&input.to_string())))
}

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:[a-zA-Z][a-zA-Z0-9]*|#[0-9]+|#[xX][0-9a-fA-F]+);").expect("valid regex"));

/// Like `escape`, leaving existing entities alone.
fn escape_once(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text = input.to_string();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for entity in ENTITY.find_iter(&text) {
        out.push_str(&html_escape(&text[last..entity.start()]));
        out.push_str(entity.as_str());
        last = entity.end();
    }
    out.push_str(&html_escape(&text[last..]));
    Ok(Value::from(out))
}

fn url_encode(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text = input.to_string();
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    Ok(Value::from(out))
}

fn url_decode(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let text = input.to_string();
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(decoded) => {
                        out.push(decoded);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            other => out.push(other),
        }
        i += 1;
    }
    Ok(Value::from(String::from_utf8_lossy(&out).into_owned()))
}

fn base64_encode(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(STANDARD.encode(input.to_string())))
}

fn base64_decode(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let bytes = STANDARD
        .decode(input.to_string().trim())
        .map_err(|e| RenderError::invalid_filter_args("base64_decode", format!("invalid base64 input: {}", e)))?;
    Ok(Value::from(String::from_utf8_lossy(&bytes).into_owned()))
}
