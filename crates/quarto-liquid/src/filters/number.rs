/*
 * filters/number.rs
 * Copyright (c) 2025 Posit, PBC
 */

use rust_decimal::RoundingStrategy;

use super::{FilterArguments, FilterRegistry, required};
use crate::ast::BinaryOp;
use crate::context::TemplateContext;
use crate::error::{RenderError, RenderResult};
use crate::value::{Value, ops};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry
        .register("abs", abs)
        .register("at_least", at_least)
        .register("at_most", at_most)
        .register("ceil", ceil)
        .register("floor", floor)
        .register("divided_by", divided_by)
        .register("minus", minus)
        .register("modulo", modulo)
        .register("plus", plus)
        .register("round", round)
        .register("times", times);
}

fn abs(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.to_number().abs()))
}

fn at_least(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let bound = required("at_least", args, 0, "number")?.to_number();
    Ok(Value::from(input.to_number().max(bound)))
}

fn at_most(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let bound = required("at_most", args, 0, "number")?.to_number();
    Ok(Value::from(input.to_number().min(bound)))
}

fn ceil(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.to_number().ceil()))
}

fn floor(input: Value, _args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    Ok(Value::from(input.to_number().floor()))
}

fn arithmetic(name: &str, op: BinaryOp, input: &Value, args: &FilterArguments) -> RenderResult<Value> {
    let operand = required(name, args, 0, "number")?.to_number();
    ops::number_op(op, input.to_number(), operand)
        .map(Value::from)
        .ok_or_else(|| match op {
            BinaryOp::Divide | BinaryOp::Modulo if operand.is_zero() => {
                RenderError::invalid_filter_args(name, "division by zero")
            }
            _ => RenderError::invalid_filter_args(name, "numeric overflow"),
        })
}

fn plus(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    arithmetic("plus", BinaryOp::Add, &input, args)
}

fn minus(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    arithmetic("minus", BinaryOp::Subtract, &input, args)
}

fn times(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    arithmetic("times", BinaryOp::Multiply, &input, args)
}

/// Integer division when both operands are integers.
fn divided_by(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    arithmetic("divided_by", BinaryOp::Divide, &input, args)
}

fn modulo(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    arithmetic("modulo", BinaryOp::Modulo, &input, args)
}

fn round(input: Value, args: &FilterArguments, _ctx: &mut TemplateContext) -> RenderResult<Value> {
    let places = args.at(0).to_integer().clamp(0, 28);
    let places = u32::try_from(places).unwrap_or(0);
    Ok(Value::from(
        input
            .to_number()
            .round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero),
    ))
}
