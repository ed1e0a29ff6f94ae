/*
 * filters/date.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The `date` filter and the date input parser it shares with hosts.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};

use super::{FilterArguments, FilterRegistry};
use crate::context::TemplateContext;
use crate::error::{RenderError, RenderResult};
use crate::options::FormatOptions;
use crate::value::Value;

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register("date", date);
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Interpret a value as a timestamp.
///
/// Accepts date-times, `now` and `today`, unix timestamps (numbers or digit
/// strings), RFC 3339 and a few common `YYYY-MM-DD` forms. Strings without an
/// offset are read in the configured time zone.
pub fn parse_date(value: &Value, format: &FormatOptions) -> Option<DateTime<FixedOffset>> {
    let zone = format.time_zone;
    match value {
        Value::DateTime(d) => Some(*d),
        Value::Number(_) => zone.timestamp_opt(value.to_integer(), 0).single(),
        Value::String(s) => {
            let text = s.trim();
            match text {
                "now" => return Some(format.now()),
                "today" => {
                    let midnight = format.now().date_naive().and_hms_opt(0, 0, 0)?;
                    return zone.from_local_datetime(&midnight).single();
                }
                _ => {}
            }
            if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                return zone.timestamp_opt(text.parse().ok()?, 0).single();
            }
            if let Ok(d) = DateTime::parse_from_rfc3339(text) {
                return Some(d);
            }
            if let Ok(d) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S %z") {
                return Some(d);
            }
            for pattern in NAIVE_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
                    return zone.from_local_datetime(&naive).single();
                }
            }
            let day = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
            zone.from_local_datetime(&day.and_hms_opt(0, 0, 0)?).single()
        }
        _ => None,
    }
}

/// `date: format`. Unparseable input passes through unchanged.
fn date(input: Value, args: &FilterArguments, ctx: &mut TemplateContext) -> RenderResult<Value> {
    let Some(timestamp) = parse_date(&input, &ctx.options().format) else {
        return Ok(input);
    };
    let pattern = args.at(0);
    if pattern.is_nil() || pattern.as_str() == Some("") {
        return Ok(Value::DateTime(timestamp));
    }

    let mut formatted = String::new();
    write!(formatted, "{}", timestamp.format(&pattern.to_string())).map_err(|_| {
        RenderError::invalid_filter_args("date", format!("invalid format string '{}'", pattern))
    })?;
    Ok(Value::from(formatted))
}
