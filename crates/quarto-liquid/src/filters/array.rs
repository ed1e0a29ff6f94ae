/*
 * filters/array.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Array filters. Non-array input is treated as its enumeration, so a
//! dictionary is a list of `[key, value]` pairs and a scalar is empty.

use std::cmp::Ordering;

use rust_decimal::Decimal;

use super::{FilterArguments, FilterRegistry, required};
use crate::context::TemplateContext;
use crate::error::{RenderError, RenderResult};
use crate::value::{Value, ops};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry
        .register("join", join)
        .register("first", first)
        .register("last", last)
        .register("concat", concat)
        .register("map", map)
        .register("reverse", reverse)
        .register("size", size)
        .register("sort", sort)
        .register("sort_natural", sort_natural)
        .register("uniq", uniq)
        .register("where", where_filter)
        .register("compact", compact)
        .register("sum", sum);
}

fn join(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let separator = if args.at(0).is_nil() {
        " ".to_string()
    } else {
        args.at(0).to_string()
    };
    let parts: Vec<String> = input.enumerate().iter().map(Value::to_string).collect();
    Ok(Value::from(parts.join(&separator)))
}

fn first(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(match &input {
        Value::String(s) => s.chars().next().map(Value::from).unwrap_or_default(),
        other => other.enumerate().into_iter().next().unwrap_or_default(),
    })
}

fn last(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(match &input {
        Value::String(s) => s.chars().next_back().map(Value::from).unwrap_or_default(),
        other => other.enumerate().pop().unwrap_or_default(),
    })
}

fn concat(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let other = required("concat", args, 0, "array")?;
    if !matches!(other, Value::Array(_)) {
        return Err(RenderError::invalid_filter_args("concat", "an array argument is required"));
    }
    let mut items = input.enumerate();
    items.extend(other.enumerate());
    Ok(Value::from(items))
}

fn map(input: Value, args: &FilterArguments, ctx: &mut TemplateContext) -> RenderResult<Value> {
    let property = required("map", args, 0, "property name")?.to_string();
    let items = input
        .enumerate()
        .iter()
        .map(|item| item.get_value(&property, ctx))
        .collect::<RenderResult<Vec<_>>>()?;
    Ok(Value::from(items))
}

fn reverse(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let mut items = input.enumerate();
    items.reverse();
    Ok(Value::from(items))
}

fn size(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.size()))
}

/// Numbers before strings, everything else last, stable.
fn natural_order(a: &Value, b: &Value, fold_case: bool) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) if fold_case => x.to_lowercase().cmp(&y.to_lowercase()),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        (Value::String(_), _) => Ordering::Less,
        (_, Value::String(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn sort_by(
    name: &str,
    input: Value,
    args: &FilterArguments,
    ctx: &TemplateContext,
    fold_case: bool,
) -> RenderResult<Value> {
    let items = input.enumerate();
    let mut keyed: Vec<(Value, Value)> = if args.at(0).is_nil() {
        items.into_iter().map(|item| (item.clone(), item)).collect()
    } else {
        let property = args.at(0).to_string();
        items
            .into_iter()
            .map(|item| Ok((item.get_value(&property, ctx)?, item)))
            .collect::<RenderResult<Vec<_>>>()?
    };
    keyed.sort_by(|(a, _), (b, _)| natural_order(a, b, fold_case));
    tracing::trace!(filter = name, count = keyed.len(), "sorted");
    Ok(Value::from(keyed.into_iter().map(|(_, item)| item).collect::<Vec<_>>()))
}

fn sort(input: Value, args: &FilterArguments, ctx: &mut TemplateContext) -> RenderResult<Value> {
    sort_by("sort", input, args, ctx, false)
}

fn sort_natural(input: Value, args: &FilterArguments, ctx: &mut TemplateContext) -> RenderResult<Value> {
    sort_by("sort_natural", input, args, ctx, true)
}

fn uniq(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let mut seen: Vec<Value> = Vec::new();
    for item in input.enumerate() {
        if !seen.iter().any(|s| ops::equals(s, &item)) {
            seen.push(item);
        }
    }
    Ok(Value::from(seen))
}

/// `where: property` keeps truthy properties; `where: property, value`
/// keeps equal ones.
fn where_filter(input: Value, args: &FilterArguments, ctx: &mut TemplateContext) -> RenderResult<Value> {
    let property = required("where", args, 0, "property name")?.to_string();
    let target = args.at(1);
    let mut kept = Vec::new();
    for item in input.enumerate() {
        let value = item.get_value(&property, ctx)?;
        let keep = if target.is_nil() {
            value.to_boolean()
        } else {
            ops::equals(&value, target)
        };
        if keep {
            kept.push(item);
        }
    }
    Ok(Value::from(kept))
}

fn compact(input: Value, args: &FilterArguments, ctx: &mut TemplateContext) -> RenderResult<Value> {
    let mut kept = Vec::new();
    for item in input.enumerate() {
        let target = if args.at(0).is_nil() {
            item.clone()
        } else {
            item.get_value(&args.at(0).to_string(), ctx)?
        };
        if !target.is_nil() {
            kept.push(item);
        }
    }
    Ok(Value::from(kept))
}

fn sum(input: Value, args: &FilterArguments, ctx: &mut TemplateContext) -> RenderResult<Value> {
    let mut total = Decimal::ZERO;
    for item in input.enumerate() {
        let value = if args.at(0).is_nil() {
            item
        } else {
            item.get_value(&args.at(0).to_string(), ctx)?
        };
        total = total.checked_add(value.to_number()).ok_or_else(|| {
            RenderError::invalid_filter_args("sum", "numeric overflow")
        })?;
    }
    Ok(Value::from(total))
}
