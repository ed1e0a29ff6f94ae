/*
 * filters/misc.rs
 * Copyright (c) 2025 Posit, PBC
 */

use super::{FilterArguments, FilterRegistry};
use crate::context::TemplateContext;
use crate::error::{RenderError, RenderResult};
use crate::value::Value;

pub(super) fn register(registry: &mut FilterRegistry) {
    registry
        .register("default", default)
        .register("json", json)
        .register("raw", raw);
}

/// The argument when the input is nil, false or empty. With
/// `allow_false: true` a false input is kept.
fn default(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let allow_false = args.named("allow_false").is_some_and(Value::to_boolean);
    let use_default = match &input {
        Value::Boolean(false) => !allow_false,
        other => other.is_nil() || other.is_empty_like(),
    };
    Ok(if use_default { args.at(0).clone() } else { input })
}

fn json(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    serde_json::to_string(&input.to_json())
        .map(Value::from)
        .map_err(|e| RenderError::invalid_filter_args("json", e.to_string()))
}

/// Identity. Output statements ending in `raw` are rewritten at parse time
/// to skip encoding.
fn raw(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{apply, apply_named};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default() {
        let fallback = || vec![Value::from("x")];
        assert_eq!(apply("default", Value::Nil, fallback()).unwrap(), Value::from("x"));
        assert_eq!(apply("default", Value::from(""), fallback()).unwrap(), Value::from("x"));
        assert_eq!(apply("default", Value::from(false), fallback()).unwrap(), Value::from("x"));
        assert_eq!(apply("default", Value::from(0), fallback()).unwrap(), Value::from(0));
        assert_eq!(
            apply_named("default", Value::from(false), fallback(), vec![("allow_false", Value::from(true))]).unwrap(),
            Value::from(false)
        );
    }

    #[test]
    fn test_json() {
        let value = Value::dictionary([
            ("a", Value::from(1)),
            ("b", Value::array([Value::from("x"), Value::Nil])),
        ]);
        assert_eq!(
            apply("json", value, vec![]).unwrap().to_string(),
            r#"{"a":1,"b":["x",null]}"#
        );
    }
}
